//! Parsed view of one rendered snapshot.
//!
//! Everything that reads the listing works on a [`Document`]: a `scraper` tree plus the page
//! address it was captured at. Elements that must be acted upon are turned into
//! [`ElementHandle`]s, which outlive the parsed tree and are resolved again by the surface.

use crate::error::{HarvestError, Result};
use crate::surface::Snapshot;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use url::Url;

/// Attribute the WebDriver surface stamps on elements that are not rendered.
pub const RENDER_HIDDEN_ATTR: &str = "data-rendered-hidden";

pub struct Document {
    html: Html,
    url: Option<Url>,
}

impl Document {
    pub fn parse(snapshot: &Snapshot) -> Self {
        Self {
            html: Html::parse_document(&snapshot.html),
            url: snapshot.url.clone(),
        }
    }

    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// All elements matching `selector`, document order.
    pub fn query(&self, selector: &str) -> Result<Vec<ElementRef<'_>>> {
        query_within(self.root(), selector)
    }

    /// Union of several selectors, deduplicated by node. Selectors that fail to
    /// parse are skipped.
    pub fn query_any(&self, selectors: &[&str]) -> Vec<ElementRef<'_>> {
        query_any_within(self.root(), selectors)
    }

    /// First element matched by the first selector that yields anything.
    pub fn first_of(&self, selectors: &[&str]) -> Option<ElementRef<'_>> {
        selectors.iter().find_map(|s| match self.query(s) {
            Ok(found) => found.into_iter().next(),
            Err(e) => {
                debug!("{}", e);
                None
            }
        })
    }
}

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| HarvestError::Selector {
        selector: selector.to_string(),
        reason: format!("{:?}", e),
    })
}

pub fn query_within<'a>(scope: ElementRef<'a>, selector: &str) -> Result<Vec<ElementRef<'a>>> {
    let sel = parse_selector(selector)?;
    Ok(scope.select(&sel).collect())
}

pub fn query_any_within<'a>(scope: ElementRef<'a>, selectors: &[&str]) -> Vec<ElementRef<'a>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for s in selectors {
        match query_within(scope, s) {
            Ok(found) => {
                for el in found {
                    if seen.insert(el.id()) {
                        out.push(el);
                    }
                }
            }
            Err(e) => debug!("Skipping selector: {}", e),
        }
    }
    // Keep document order regardless of selector order.
    let order: HashMap<_, usize> = scope
        .descendants()
        .enumerate()
        .map(|(i, n)| (n.id(), i))
        .collect();
    out.sort_by_key(|e| order.get(&e.id()).copied().unwrap_or(usize::MAX));
    out
}

/// First match inside `scope` across a selector list.
pub fn first_within<'a>(scope: ElementRef<'a>, selectors: &str) -> Option<ElementRef<'a>> {
    let sel = parse_selector(selectors).ok()?;
    scope.select(&sel).next()
}

/// Nearest element (self included) matching `selector`.
pub fn closest<'a>(el: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .find(|e| selector.matches(e))
}

/// Concatenated text content, trimmed.
pub fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

pub fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

pub fn is_disabled(el: ElementRef<'_>) -> bool {
    let v = el.value();
    v.attr("disabled").is_some() || v.attr("aria-disabled") == Some("true")
}

/// Whether the element is rendered. The render stamp already reflects the element's
/// own computed box, so it is read on the element alone; attributes and inline styles
/// are checked up the ancestor chain.
pub fn is_rendered(el: ElementRef<'_>) -> bool {
    el.value().attr(RENDER_HIDDEN_ATTR).is_none()
        && std::iter::once(el)
            .chain(el.ancestors().filter_map(ElementRef::wrap))
            .all(|e| !hidden_by_markup(e))
}

fn hidden_by_markup(el: ElementRef<'_>) -> bool {
    let v = el.value();
    if v.attr("hidden").is_some() || v.attr("aria-hidden") == Some("true") {
        return true;
    }
    let Some(style) = v.attr("style") else { return false };
    style.split(';').any(|decl| {
        let Some((prop, value)) = decl.split_once(':') else { return false };
        let prop = prop.trim().to_ascii_lowercase();
        let value = value.trim().trim_end_matches("!important").trim().to_ascii_lowercase();
        match prop.as_str() {
            "display" => value == "none",
            "visibility" => value == "hidden",
            "opacity" => value.parse::<f64>().map(|o| o == 0.0).unwrap_or(false),
            "width" | "height" => value == "0" || value == "0px",
            _ => false,
        }
    })
}

// ── Handles ───────────────────────────────────────────────────────────────────

/// A stable reference to an element of a snapshot, usable as an XPath.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub xpath: String,
    pub tag: String,
    pub text: String,
}

impl ElementHandle {
    pub fn of(el: ElementRef<'_>) -> Self {
        let mut segments: Vec<String> = std::iter::once(el)
            .chain(el.ancestors().filter_map(ElementRef::wrap))
            .map(path_segment)
            .collect();
        segments.reverse();
        Self {
            xpath: format!("/{}", segments.join("/")),
            tag: el.value().name().to_string(),
            text: text_of(el),
        }
    }
}

fn path_segment(el: ElementRef<'_>) -> String {
    let name = el.value().name();
    let position = el
        .prev_siblings()
        .filter_map(ElementRef::wrap)
        .filter(|s| s.value().name() == name)
        .count()
        + 1;
    format!("{}[{}]", name, position)
}

#[cfg(test)]
pub(crate) fn doc(html: &str) -> Document {
    Document::parse(&Snapshot::new(html.to_string(), None))
}
