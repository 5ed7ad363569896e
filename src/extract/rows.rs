//! Row discovery: which elements of the listing are invoice rows.

use super::patterns::{CURRENCY_AMOUNT, LONG_TOKEN, has_plausible_row_text};
use crate::dom::{self, Document, closest, is_rendered, parse_selector, text_of};
use scraper::ElementRef;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// How a query's matches relate to rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Row,
    /// Matches sit inside a row; resolve to the enclosing `[role="row"]`.
    Cell,
}

/// Most specific first.
const ROW_QUERIES: &[(&str, Level)] = &[
    (r#".ms-DetailsRow[role="row"]"#, Level::Row),
    (r#".ms-List-cell[role="gridcell"]"#, Level::Cell),
    ("[data-list-index]", Level::Row),
    (".ms-DetailsRow", Level::Row),
    (r#"[role="row"]"#, Level::Row),
    (r#"tr[role="row"]"#, Level::Row),
    (".ms-List-cell", Level::Cell),
    ("[data-automation-key]", Level::Cell),
    (".ms-DetailsRow-cell", Level::Cell),
    (r#"div[role="gridcell"]"#, Level::Cell),
];

const ROW_ANCESTOR: &str = r#"[role="row"]"#;
const RECORD_SUB_ELEMENTS: &str = ".internalId-link, .griCellTitle, .griCellSubTitle";
const ELECTRONIC_NUMBER_NODES: &str =
    r#".internalId-link a, [data-automation-key="uuid"] a, .griCellTitle"#;
const INTERNAL_NUMBER_NODES: &str =
    r#".griCellSubTitle, [data-automation-key="uuid"] .griCellSubTitle"#;
const AMOUNT_NODES: &str = r#"[data-automation-key="total"], .griCellTitleGray"#;

/// Locate every visible invoice row, once per visual row, in document order.
pub fn locate_rows(doc: &Document) -> Vec<ElementRef<'_>> {
    let row_sel = match parse_selector(ROW_ANCESTOR) {
        Ok(s) => s,
        Err(e) => {
            warn!("{}", e);
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for (query, level) in ROW_QUERIES {
        let matches = match doc.query(query) {
            Ok(m) => m,
            Err(e) => {
                warn!("Row query skipped: {}", e);
                continue;
            }
        };
        let before = candidates.len();
        for el in matches {
            let row = match level {
                Level::Row => el,
                Level::Cell => closest(el, &row_sel).unwrap_or(el),
            };
            if is_plausible_row(row) && seen.insert(row.id()) {
                candidates.push(row);
            }
        }
        if candidates.len() > before {
            debug!("{} new rows via {}", candidates.len() - before, query);
        }
    }

    let order: HashMap<_, usize> = doc
        .root()
        .descendants()
        .enumerate()
        .map(|(i, n)| (n.id(), i))
        .collect();
    let mut rows = outermost(candidates);
    rows.sort_by_key(|r| order.get(&r.id()).copied().unwrap_or(usize::MAX));

    let rows: Vec<_> = rows
        .into_iter()
        .filter(|row| is_rendered(*row) && has_record_data(*row))
        .collect();
    debug!("Row locator: {} rows", rows.len());
    rows
}

/// Drop candidates nested inside another candidate so a wrapper and the row it
/// contains count once.
fn outermost(mut candidates: Vec<ElementRef<'_>>) -> Vec<ElementRef<'_>> {
    let ids: HashSet<_> = candidates.iter().map(|c| c.id()).collect();
    candidates.retain(|c| !c.ancestors().any(|a| ids.contains(&a.id())));
    candidates
}

/// Text or structure that only invoice rows have.
pub fn is_plausible_row(row: ElementRef<'_>) -> bool {
    let text: String = row.text().collect();
    has_plausible_row_text(&text) || dom::first_within(row, RECORD_SUB_ELEMENTS).is_some()
}

/// The row exposes an electronic number, internal number or amount.
pub fn has_record_data(row: ElementRef<'_>) -> bool {
    let filled = |sel: &str| {
        dom::first_within(row, sel)
            .map(|el| !text_of(el).is_empty())
            .unwrap_or(false)
    };
    if filled(ELECTRONIC_NUMBER_NODES) || filled(INTERNAL_NUMBER_NODES) || filled(AMOUNT_NODES) {
        return true;
    }
    let text: String = row.text().collect();
    LONG_TOKEN.is_match(&text) || CURRENCY_AMOUNT.is_match(&text)
}
