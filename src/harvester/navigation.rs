//! Moving the listing to an arbitrary page.

use super::Harvester;
use crate::dom::{Document, ElementHandle, is_disabled, is_rendered, text_of};
use crate::error::{HarvestError, Result};
use crate::pagination::{self, PAGE_INPUTS};
use crate::surface::{ListingSurface, UiSignal};
use tokio::time::sleep;
use tracing::{debug, info};

const NEXT_CONTROLS: &[&str] = &[
    r#"button[aria-label*="Next"]"#,
    r#"button[aria-label*="next"]"#,
    r#"button[title*="Next"]"#,
    r#"button[title*="next"]"#,
    r#"button[aria-label*="التالي"]"#,
    r#"button:has([data-icon-name="ChevronRight"])"#,
    r#"button:has([class*="chevron-right"])"#,
    r#".ms-Button:has([data-icon-name="ChevronRight"])"#,
];

const PREVIOUS_CONTROLS: &[&str] = &[
    r#"button[aria-label*="Previous"]"#,
    r#"button[aria-label*="previous"]"#,
    r#"button[title*="Previous"]"#,
    r#"button[title*="previous"]"#,
    r#"button[aria-label*="السابق"]"#,
    r#"button:has([data-icon-name="ChevronLeft"])"#,
    r#"button:has([class*="chevron-left"])"#,
    r#".ms-Button:has([data-icon-name="ChevronLeft"])"#,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Forward,
    Backward,
}

impl Direction {
    fn selectors(self) -> &'static [&'static str] {
        match self {
            Direction::Forward => NEXT_CONTROLS,
            Direction::Backward => PREVIOUS_CONTROLS,
        }
    }

    fn matches_label(self, text: &str) -> bool {
        let lower = text.to_lowercase();
        match self {
            Direction::Forward => {
                text == ">" || text == "»" || lower.contains("next") || text.contains("التالي")
            }
            Direction::Backward => {
                text == "<" || text == "«" || lower.contains("previous") || text.contains("السابق")
            }
        }
    }
}

#[derive(Debug)]
enum Route {
    Button(ElementHandle),
    Input(ElementHandle),
}

fn usable(el: scraper::ElementRef<'_>) -> bool {
    !is_disabled(el) && is_rendered(el)
}

/// A page-number control or a page input that can take us to `target` directly.
fn direct_route(doc: &Document, target: u32) -> Option<Route> {
    let wanted = target.to_string();
    let button = doc
        .query("button, a")
        .unwrap_or_default()
        .into_iter()
        .find(|el| text_of(*el) == wanted && usable(*el));
    if let Some(button) = button {
        return Some(Route::Button(ElementHandle::of(button)));
    }

    doc.query(PAGE_INPUTS)
        .unwrap_or_default()
        .into_iter()
        .find(|el| usable(*el))
        .map(|input| Route::Input(ElementHandle::of(input)))
}

/// The enabled next or previous control, by attribute or icon first, then by label.
pub(crate) fn find_step_control(doc: &Document, direction: Direction) -> Option<ElementHandle> {
    let by_selector = direction.selectors().iter().find_map(|selector| {
        doc.query(selector)
            .map_err(|e| debug!("{}", e))
            .ok()?
            .into_iter()
            .next()
            .filter(|el| usable(*el))
    });
    let control = by_selector.or_else(|| {
        doc.query("button")
            .unwrap_or_default()
            .into_iter()
            .find(|el| usable(*el) && direction.matches_label(&text_of(*el)))
    })?;
    Some(ElementHandle::of(control))
}

impl<S: ListingSurface> Harvester<S> {
    /// Bring the listing to `target`. Tries a page button, then a page input, then
    /// stepping when the target is close to the page actually shown. Returns whether
    /// anything was clicked or typed.
    pub(crate) async fn navigate_to_page(&self, target: u32) -> Result<bool> {
        let snapshot = self.surface.snapshot().await?;
        let (from, route) = {
            let doc = Document::parse(&snapshot);
            (pagination::observed_page(&doc), direct_route(&doc, target))
        };
        if from == target {
            debug!("Already on page {}", target);
            return Ok(false);
        }
        info!("Navigating to page {} from {}", target, from);

        match route {
            Some(Route::Button(button)) => {
                debug!("Clicking page {} button", target);
                self.surface.click(&button).await?;
                return Ok(true);
            }
            Some(Route::Input(input)) => {
                debug!("Typing page {} into page input", target);
                self.surface.set_value(&input, &target.to_string()).await?;
                for signal in [UiSignal::Input, UiSignal::Change, UiSignal::EnterKey] {
                    self.surface.dispatch(&input, signal).await?;
                }
                return Ok(true);
            }
            None => {}
        }

        let distance = target.abs_diff(from);
        if distance > self.config.step_navigation_window {
            return Err(HarvestError::Navigation(target));
        }
        let direction = if target > from { Direction::Forward } else { Direction::Backward };
        debug!("Stepping {:?} {} pages from {}", direction, distance, from);
        for _ in 0..distance {
            self.step(direction, target).await?;
            sleep(self.config.navigation_step_delay()).await;
        }
        Ok(true)
    }

    async fn step(&self, direction: Direction, target: u32) -> Result<()> {
        let snapshot = self.surface.snapshot().await?;
        let control = {
            let doc = Document::parse(&snapshot);
            find_step_control(&doc, direction)
        };
        let control = control.ok_or(HarvestError::Navigation(target))?;
        self.surface.click(&control).await?;
        Ok(())
    }
}
