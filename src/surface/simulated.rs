//! In-memory portal listing for tests. Renders Fluent-style markup for the current page
//! and reacts to clicks, selects and page inputs the way the portal does.

use super::{ListingSurface, Snapshot, UiSignal};
use crate::config::HarvestConfig;
use crate::dom::ElementHandle;
use crate::error::SurfaceError;
use async_trait::async_trait;
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;

/// Delays shrunk so engine tests finish in milliseconds.
pub fn fast_config() -> HarvestConfig {
    HarvestConfig {
        settle_delay_ms: 1,
        page_settle_delay_ms: 1,
        dropdown_open_delay_ms: 1,
        navigation_step_delay_ms: 1,
        condition_poll_interval_ms: 1,
        condition_timeout_ms: 40,
        stability_delay_ms: 0,
        rescan_debounce_ms: 20,
        ..HarvestConfig::default()
    }
}

#[derive(Debug)]
struct Listing {
    total: usize,
    rows_per_page: usize,
    page: u32,
    size_label: Option<u32>,
    select_sizes: Vec<u32>,
    dropdown_items: Vec<u32>,
    dropdown_open: bool,
    page_buttons: bool,
    hidden_buttons: HashSet<u32>,
    page_input: bool,
    step_controls: bool,
    loading_frames: usize,
    pending_input: Option<String>,
    ignored_clicks: usize,
    visited: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Page(u32),
    Next,
    Prev,
    Dropdown,
    Size(u32),
    SizeSelect,
    PageInput,
}

impl Control {
    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "next" => Some(Self::Next),
            "prev" => Some(Self::Prev),
            "dropdown" => Some(Self::Dropdown),
            "size-select" => Some(Self::SizeSelect),
            "page-input" => Some(Self::PageInput),
            _ => {
                if let Some(n) = tag.strip_prefix("page-") {
                    n.parse().ok().map(Self::Page)
                } else {
                    tag.strip_prefix("size-")?.parse().ok().map(Self::Size)
                }
            }
        }
    }
}

pub struct SimulatedListing {
    listing: Mutex<Listing>,
    snapshots: AtomicUsize,
}

impl SimulatedListing {
    /// `total` invoices shown `rows_per_page` at a time, starting on page 1 with page
    /// buttons, next/previous controls and a "Results: N" line.
    pub fn new(total: usize, rows_per_page: usize) -> Self {
        Self {
            listing: Mutex::new(Listing {
                total,
                rows_per_page,
                page: 1,
                size_label: None,
                select_sizes: Vec::new(),
                dropdown_items: Vec::new(),
                dropdown_open: false,
                page_buttons: true,
                hidden_buttons: HashSet::new(),
                page_input: false,
                step_controls: true,
                loading_frames: 0,
                pending_input: None,
                ignored_clicks: 0,
                visited: vec![1],
            }),
            snapshots: AtomicUsize::new(0),
        }
    }

    fn edit(self, f: impl FnOnce(&mut Listing)) -> Self {
        f(&mut self.listing.lock().unwrap());
        self
    }

    /// Native page-size select offering these sizes.
    pub fn with_select(self, sizes: &[u32]) -> Self {
        self.edit(|l| l.select_sizes = sizes.to_vec())
    }

    /// Fluent dropdown offering these sizes once opened.
    pub fn with_dropdown(self, sizes: &[u32]) -> Self {
        self.edit(|l| l.dropdown_items = sizes.to_vec())
    }

    /// The page-size label claims `size`, whatever the grid actually shows.
    pub fn with_size_label(self, size: u32) -> Self {
        self.edit(|l| l.size_label = Some(size))
    }

    pub fn with_page_input(self) -> Self {
        self.edit(|l| l.page_input = true)
    }

    pub fn with_loading_frames(self, frames: usize) -> Self {
        self.edit(|l| l.loading_frames = frames)
    }

    pub fn without_page_buttons(self) -> Self {
        self.edit(|l| l.page_buttons = false)
    }

    pub fn without_step_controls(self) -> Self {
        self.edit(|l| l.step_controls = false)
    }

    /// The next `clicks` clicks are swallowed, like a host that was still busy.
    pub fn ignore_clicks(self, clicks: usize) -> Self {
        self.edit(|l| l.ignored_clicks = clicks)
    }

    /// Never render a button for `page`.
    pub fn hide_page_button(self, page: u32) -> Self {
        self.edit(|l| {
            l.hidden_buttons.insert(page);
        })
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }

    /// Pages shown so far, in order, starting with page 1.
    pub fn visited(&self) -> Vec<u32> {
        self.listing.lock().unwrap().visited.clone()
    }

    pub fn current_page(&self) -> u32 {
        self.listing.lock().unwrap().page
    }

    fn resolve(&self, target: &ElementHandle) -> Result<Control, SurfaceError> {
        let html = render(&self.listing.lock().unwrap());
        let doc = Html::parse_document(&html);
        let el = doc
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| ElementHandle::of(*el).xpath == target.xpath)
            .ok_or_else(|| SurfaceError::ElementNotFound(target.xpath.clone()))?;
        std::iter::once(el)
            .chain(el.ancestors().filter_map(ElementRef::wrap))
            .find_map(|e| e.value().attr("data-sim").and_then(Control::parse))
            .ok_or_else(|| SurfaceError::ElementNotFound(target.xpath.clone()))
    }
}

impl Listing {
    fn pages(&self) -> u32 {
        (self.total.div_ceil(self.rows_per_page.max(1)) as u32).max(1)
    }

    fn go(&mut self, page: u32) {
        if page >= 1 && page <= self.pages() && page != self.page {
            self.page = page;
            self.visited.push(page);
        }
    }

    fn resize(&mut self, size: u32) {
        self.rows_per_page = size as usize;
        self.size_label = None;
        self.dropdown_open = false;
        self.go(1);
    }
}

fn render(l: &Listing) -> String {
    let mut out = String::from("<html><body><div class=\"ms-DetailsList\">");
    let start = (l.page as usize - 1) * l.rows_per_page;
    let end = (start + l.rows_per_page).min(l.total);
    for i in start + 1..=end {
        let _ = write!(
            out,
            r#"<div class="ms-List-cell" data-list-index="{idx}">
                 <div class="ms-DetailsRow" role="row">
                   <div class="ms-DetailsRow-cell" data-automation-key="uuid">
                     <div class="internalId-link"><a class="griCellTitle">EN{i:018}</a></div>
                     <div class="griCellSubTitle">INT-{i}</div>
                   </div>
                   <div class="ms-DetailsRow-cell" data-automation-key="dateTimeReceived">
                     <div class="griCellTitleGray">{day:02}/03/2024</div>
                     <div class="griCellSubTitle">10:15 AM</div>
                   </div>
                   <div class="ms-DetailsRow-cell" data-automation-key="total">
                     <div class="griCellTitleGray">1,140.00 EGP</div>
                   </div>
                 </div>
               </div>"#,
            idx = i - start - 1,
            day = i % 28 + 1,
        );
    }
    out.push_str("</div><div class=\"ms-CommandBar pagination\">");

    let shown_size = l.size_label.unwrap_or(l.rows_per_page as u32);
    if !l.select_sizes.is_empty() || l.size_label.is_some() {
        let mut sizes = l.select_sizes.clone();
        if !sizes.contains(&shown_size) {
            sizes.push(shown_size);
            sizes.sort_unstable();
        }
        out.push_str(r#"<select aria-label="Items per page" data-sim="size-select">"#);
        for s in sizes {
            let selected = if s == shown_size { " selected" } else { "" };
            let _ = write!(out, r#"<option value="{s}"{selected}>{s} per page</option>"#);
        }
        out.push_str("</select>");
    }

    if !l.dropdown_items.is_empty() {
        let _ = write!(
            out,
            r#"<div class="ms-Dropdown" data-sim="dropdown"><span class="ms-Dropdown-title">{shown_size} per page</span></div>"#
        );
        if l.dropdown_open {
            out.push_str(r#"<div class="ms-Callout">"#);
            for s in &l.dropdown_items {
                let _ = write!(
                    out,
                    r#"<div class="ms-Dropdown-item" role="option" data-sim="size-{s}">{s}</div>"#
                );
            }
            out.push_str("</div>");
        }
    }

    let pages = l.pages();
    if l.step_controls {
        let disabled = if l.page == 1 { " disabled" } else { "" };
        let _ = write!(
            out,
            r#"<button class="ms-Button" aria-label="Previous page" data-sim="prev"{disabled}>‹</button>"#
        );
    }
    if l.page_buttons {
        let from = l.page.saturating_sub(2).max(1);
        let to = (l.page + 2).min(pages);
        for p in (from..=to).filter(|p| !l.hidden_buttons.contains(p)) {
            if p == l.page {
                let _ = write!(
                    out,
                    r#"<button class="ms-Button ms-Button--primary" aria-pressed="true" data-sim="page-{p}">{p}</button>"#
                );
            } else {
                let _ = write!(out, r#"<button class="ms-Button" data-sim="page-{p}">{p}</button>"#);
            }
        }
    }
    if l.step_controls {
        let disabled = if l.page == pages { " disabled" } else { "" };
        let _ = write!(
            out,
            r#"<button class="ms-Button" aria-label="Next page" data-sim="next"{disabled}>›</button>"#
        );
    }
    if l.page_input {
        let _ = write!(
            out,
            r#"<input type="number" aria-label="Go to page" data-sim="page-input" value="{}">"#,
            l.page
        );
    }
    let _ = write!(out, "<span>Results: {}</span>", l.total);
    out.push_str("</div>");
    if l.loading_frames > 0 {
        out.push_str(r#"<div class="ms-Spinner">Loading</div>"#);
    }
    out.push_str("</body></html>");
    out
}

#[async_trait]
impl ListingSurface for SimulatedListing {
    async fn snapshot(&self) -> Result<Snapshot, SurfaceError> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        let mut l = self.listing.lock().unwrap();
        let html = render(&l);
        l.loading_frames = l.loading_frames.saturating_sub(1);
        let url = Url::parse(&format!("https://invoicing.eta.gov.eg/documents?page={}", l.page)).ok();
        Ok(Snapshot::new(html, url))
    }

    async fn click(&self, target: &ElementHandle) -> Result<(), SurfaceError> {
        let control = self.resolve(target)?;
        let mut l = self.listing.lock().unwrap();
        if l.ignored_clicks > 0 {
            l.ignored_clicks -= 1;
            return Ok(());
        }
        match control {
            Control::Page(p) => l.go(p),
            Control::Next => {
                let next = l.page + 1;
                l.go(next)
            }
            Control::Prev => {
                let prev = l.page.saturating_sub(1);
                l.go(prev)
            }
            Control::Dropdown => l.dropdown_open = true,
            Control::Size(s) => l.resize(s),
            Control::SizeSelect | Control::PageInput => {}
        }
        Ok(())
    }

    async fn select_value(&self, target: &ElementHandle, value: &str) -> Result<(), SurfaceError> {
        if self.resolve(target)? != Control::SizeSelect {
            return Err(SurfaceError::Unsupported("select on a non-select control"));
        }
        if let Ok(size) = value.parse() {
            self.listing.lock().unwrap().resize(size);
        }
        Ok(())
    }

    async fn set_value(&self, target: &ElementHandle, value: &str) -> Result<(), SurfaceError> {
        if self.resolve(target)? == Control::PageInput {
            self.listing.lock().unwrap().pending_input = Some(value.to_string());
        }
        Ok(())
    }

    async fn dispatch(&self, target: &ElementHandle, signal: UiSignal) -> Result<(), SurfaceError> {
        if self.resolve(target)? != Control::PageInput || signal == UiSignal::Input {
            return Ok(());
        }
        let mut l = self.listing.lock().unwrap();
        if let Some(page) = l.pending_input.take().and_then(|v| v.parse().ok()) {
            l.go(page);
        }
        Ok(())
    }
}
