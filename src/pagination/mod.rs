//! Pagination inference from the chrome around the listing.
//!
//! Every value comes from a cascade of weaker and weaker signals, and the result is
//! clamped so it never contradicts what was observed on the page:
//! `total_pages >= current_page >= 1` and `total_count >= observed`.

use crate::dom::{Document, RENDER_HIDDEN_ATTR, text_of};
use crate::error::Result;
use crate::models::PaginationState;
use regex::Regex;
use scraper::{ElementRef, Node};
use std::sync::LazyLock;
use tracing::{debug, warn};

const ACTIVE_PAGE_SELECTORS: &[&str] = &[
    r#".ms-Button--primary[aria-pressed="true"]"#,
    r#"[aria-current="page"]"#,
    ".active",
    ".selected",
    ".current",
    r#"[class*="active"][class*="page"]"#,
    r#"[class*="selected"][class*="page"]"#,
    r#".ms-Button[aria-pressed="true"]"#,
];

pub const PAGE_INPUTS: &str =
    r#"input[type="number"], input[aria-label*="page"], input[placeholder*="page"]"#;

const CHROME_AREAS: &str =
    r#".ms-CommandBar, [class*="pagination"], [class*="pager"], .ms-Nav, [class*="footer"]"#;

const PAGE_SIZE_LABELS: &str = "select, .ms-Dropdown-title";

const COMMON_PAGE_SIZES: &[u32] = &[10, 20, 25, 50, 100];

/// Page-number controls above this are not page numbers.
const MAX_PAGE_NUMBER: u32 = 1000;

/// Ordered; the last participating group holds the total.
static TOTAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)Results:\s*([0-9][0-9,]*)",
        r"(?i)([0-9][0-9,]*)\s*results",
        r"(?i)total:\s*([0-9][0-9,]*)",
        r"النتائج:\s*([0-9][0-9,]*)",
        r"([0-9][0-9,]*)\s*نتيجة",
        r"من\s*([0-9][0-9,]*)",
        r"إجمالي:\s*([0-9][0-9,]*)",
        r"(?i)([0-9]+)\s*-\s*[0-9]+\s*of\s*([0-9][0-9,]*)",
        r"([0-9]+)\s*-\s*[0-9]+\s*من\s*([0-9][0-9,]*)",
        r"(?i)showing\s*[0-9]+\s*-\s*[0-9]+\s*of\s*([0-9][0-9,]*)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

static PAGE_SIZE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([0-9]+)\s*(?:per page|items|عنصر)").expect("static regex")
});

/// Infer pagination for the document, given how many records were observed on it.
pub fn estimate(doc: &Document, observed: usize, default_page_size: u32) -> PaginationState {
    match try_estimate(doc, observed, default_page_size) {
        Ok(state) => {
            debug!(
                "Page {} of {}, total {} ({} per page)",
                state.current_page, state.total_pages, state.total_count, state.page_size
            );
            state
        }
        Err(e) => {
            warn!("Pagination inference failed, using defaults: {}", e);
            fallback(doc, observed, default_page_size)
        }
    }
}

fn try_estimate(doc: &Document, observed: usize, default_page_size: u32) -> Result<PaginationState> {
    let max_button = max_page_button(doc)?;
    let current = current_page(doc)?;
    let page_size = page_size(doc, observed, current, max_button, default_page_size)?;
    let total = total_count(doc, observed, max_button, page_size)?;
    Ok(clamp(current, page_size, total, observed))
}

/// Derive total pages and enforce the invariants.
pub fn clamp(current: u32, page_size: u32, total: usize, observed: usize) -> PaginationState {
    let current_page = current.max(1);
    let page_size = page_size.max(1);
    let total_count = total.max(observed);
    let total_pages = (total_count.div_ceil(page_size as usize) as u32).max(current_page);
    PaginationState {
        current_page,
        total_pages,
        page_size,
        total_count,
    }
}

/// Used when inference itself fails.
pub fn fallback(doc: &Document, observed: usize, default_page_size: u32) -> PaginationState {
    let total_pages = max_page_button(doc).unwrap_or(1).max(1);
    PaginationState {
        current_page: 1,
        total_pages,
        page_size: default_page_size,
        total_count: observed.max(total_pages as usize * default_page_size as usize),
    }
}

// ── Total count ───────────────────────────────────────────────────────────────

fn total_count(doc: &Document, observed: usize, max_button: u32, page_size: u32) -> Result<usize> {
    for text in text_nodes(doc) {
        if let Some(n) = match_total(&text).filter(|n| *n > observed) {
            debug!("Total {} from text {:?}", n, text);
            return Ok(n);
        }
    }

    for area in doc.query(CHROME_AREAS)? {
        if let Some(n) = match_total(&text_of(area)).filter(|n| *n > 0 && *n >= observed) {
            debug!("Total {} from pagination area", n);
            return Ok(n);
        }
    }

    if max_button > 1 {
        let estimated = max_button as usize * page_size as usize;
        debug!("Total estimated as {} from max page {}", estimated, max_button);
        return Ok(estimated);
    }

    Ok(observed.max(50))
}

fn match_total(text: &str) -> Option<usize> {
    TOTAL_PATTERNS.iter().find_map(|re| {
        let caps = re.captures(text)?;
        let last = caps.iter().skip(1).flatten().last()?;
        last.as_str().replace(',', "").parse().ok()
    })
}

/// Visible text nodes in document order, outside scripts and styles.
fn text_nodes(doc: &Document) -> Vec<String> {
    doc.root()
        .descendants()
        .filter_map(|node| {
            let Node::Text(text) = node.value() else { return None };
            let parent = node.parent().and_then(ElementRef::wrap)?;
            let tag = parent.value().name();
            if tag == "script" || tag == "style" || parent.value().attr(RENDER_HIDDEN_ATTR).is_some() {
                return None;
            }
            let t = text.trim();
            (!t.is_empty()).then(|| t.to_string())
        })
        .collect()
}

// ── Current page ──────────────────────────────────────────────────────────────

/// The page the listing shows right now, 1 when nothing says otherwise.
pub fn observed_page(doc: &Document) -> u32 {
    current_page(doc).unwrap_or(1)
}

fn current_page(doc: &Document) -> Result<u32> {
    for selector in ACTIVE_PAGE_SELECTORS {
        let Ok(found) = doc.query(selector) else { continue };
        if let Some(n) = found.into_iter().find_map(|el| parse_page_number(&text_of(el))) {
            debug!("Current page {} from {}", n, selector);
            return Ok(n);
        }
    }

    for input in doc.query(PAGE_INPUTS)? {
        if let Some(n) = input.value().attr("value").and_then(parse_page_number) {
            debug!("Current page {} from input", n);
            return Ok(n);
        }
    }

    if let Some(url) = doc.url() {
        let from_url = url
            .query_pairs()
            .find(|(k, _)| k == "page" || k == "p" || k == "pageNumber")
            .and_then(|(_, v)| parse_page_number(&v));
        if let Some(n) = from_url {
            debug!("Current page {} from address", n);
            return Ok(n);
        }
    }

    Ok(1)
}

fn parse_page_number(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok().filter(|n| *n > 0)
}

/// Largest page number shown on a button or link; 1 when none.
pub fn max_page_button(doc: &Document) -> Result<u32> {
    Ok(doc
        .query("button, a")?
        .into_iter()
        .filter_map(|el| parse_page_number(&text_of(el)))
        .filter(|n| *n < MAX_PAGE_NUMBER)
        .max()
        .unwrap_or(1))
}

// ── Page size ─────────────────────────────────────────────────────────────────

fn page_size(
    doc: &Document,
    observed: usize,
    current: u32,
    max_button: u32,
    default_page_size: u32,
) -> Result<u32> {
    for control in doc.query(PAGE_SIZE_LABELS)? {
        let label = if control.value().name() == "select" {
            selected_option_text(control)
        } else {
            text_of(control)
        };
        if let Some(size) = PAGE_SIZE_LABEL
            .captures(&label)
            .and_then(|c| c[1].parse::<u32>().ok())
            .filter(|s| *s > 0)
        {
            debug!("Page size {} from label {:?}", size, label);
            return Ok(size);
        }
    }

    // A full page is only a reliable size when more pages follow.
    if observed > 0 && max_button > current {
        return Ok(observed as u32);
    }

    if let Some(size) = COMMON_PAGE_SIZES.iter().find(|s| observed <= **s as usize) {
        return Ok(*size);
    }

    Ok((observed as u32).max(default_page_size))
}

fn selected_option_text(select: ElementRef<'_>) -> String {
    let Ok(options) = crate::dom::query_within(select, "option") else {
        return String::new();
    };
    options
        .iter()
        .find(|o| o.value().attr("selected").is_some())
        .or(options.first())
        .map(|o| text_of(*o))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::doc;
    use crate::surface::Snapshot;
    use url::Url;

    fn buttons(pages: std::ops::RangeInclusive<u32>, active: u32) -> String {
        pages
            .map(|p| {
                if p == active {
                    format!(r#"<button class="ms-Button" aria-pressed="true">{}</button>"#, p)
                } else {
                    format!("<button>{}</button>", p)
                }
            })
            .collect()
    }

    fn assert_invariants(s: &PaginationState, observed: usize) {
        assert!(s.current_page >= 1);
        assert!(s.total_pages >= s.current_page);
        assert!(s.total_count >= observed);
        assert!(s.page_size > 0);
    }

    #[test]
    fn test_explicit_results_text() {
        let html = format!(
            r#"<div class="grid"></div><div class="pagination">{}</div><span>150 results</span>"#,
            buttons(1..=3, 1)
        );
        let s = estimate(&doc(&html), 50, 50);
        assert_eq!(s.current_page, 1);
        assert_eq!(s.page_size, 50);
        assert_eq!(s.total_count, 150);
        assert_eq!(s.total_pages, 3);
    }

    #[test]
    fn test_range_text_with_grouping_and_active_button() {
        let html = format!(
            r#"<footer class="footer">Showing 51 - 100 of 1,250</footer>{}"#,
            buttons(1..=5, 2)
        );
        let s = estimate(&doc(&html), 50, 50);
        assert_eq!(s.current_page, 2);
        assert_eq!(s.total_count, 1250);
        assert_eq!(s.total_pages, 25);
    }

    #[test]
    fn test_total_not_above_observed_is_ignored() {
        let s = estimate(&doc("<span>Results: 20</span>"), 30, 50);
        assert_eq!(s.total_count, 50);
        assert_invariants(&s, 30);
    }

    #[test]
    fn test_split_text_found_in_chrome_area() {
        let html = r#"<div class="ms-CommandBar"><span>Results:</span> <b>75</b></div>"#;
        let s = estimate(&doc(html), 25, 50);
        assert_eq!(s.total_count, 75);
        assert_eq!(s.total_pages, 3);
    }

    #[test]
    fn test_current_page_from_input_then_address() {
        let s = estimate(&doc(r#"<input type="number" value="4">"#), 10, 50);
        assert_eq!(s.current_page, 4);

        let snap = Snapshot::new(
            "<div></div>".into(),
            Some(Url::parse("https://invoicing.eta.gov.eg/documents?page=3").unwrap()),
        );
        let s = estimate(&Document::parse(&snap), 10, 50);
        assert_eq!(s.current_page, 3);
        assert_invariants(&s, 10);
    }

    #[test]
    fn test_page_size_label_and_button_estimate() {
        let html = format!(
            r#"<div class="ms-Dropdown-title">20 per page</div>{}"#,
            buttons(1..=7, 1)
        );
        let s = estimate(&doc(&html), 20, 50);
        assert_eq!(s.page_size, 20);
        assert_eq!(s.total_count, 140);
        assert_eq!(s.total_pages, 7);
    }

    #[test]
    fn test_last_page_size_falls_back_to_common_sizes() {
        let html = format!("<span>Results: 25</span>{}", buttons(1..=3, 3));
        let s = estimate(&doc(&html), 5, 50);
        assert_eq!(s.current_page, 3);
        assert_eq!(s.page_size, 10);
        assert_eq!(s.total_count, 25);
        assert_eq!(s.total_pages, 3);
    }

    #[test]
    fn test_invariants_hold_on_every_branch() {
        let cases: Vec<(String, usize)> = vec![
            ("".into(), 0),
            ("<span>Results: 3</span>".into(), 120),
            (buttons(1..=4, 9), 12),
            (r#"<a aria-current="page">8</a><span>total: 10</span>"#.into(), 2),
            (r#"<select><option selected>500 items</option></select>"#.into(), 40),
        ];
        for (html, observed) in cases {
            let s = estimate(&doc(&html), observed, 50);
            assert_invariants(&s, observed);
        }
    }

    #[test]
    fn test_fallback_state() {
        let html = buttons(1..=6, 1);
        let s = fallback(&doc(&html), 10, 50);
        assert_eq!(s.current_page, 1);
        assert_eq!(s.total_pages, 6);
        assert_eq!(s.total_count, 300);
        assert_eq!(s.page_size, 50);
    }
}
