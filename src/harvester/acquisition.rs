//! Full-dataset acquisition: one bulk page-size expansion if the listing allows it,
//! otherwise a page-by-page traversal.

use super::{AcquisitionGuard, Harvester};
use crate::dom::{Document, ElementHandle, has_class, query_within, text_of};
use crate::error::{HarvestError, Result};
use crate::models::{AcquisitionOptions, AcquisitionResult, CurrentPageData, ProgressSnapshot, Record};
use crate::surface::{ListingSurface, UiSignal};
use crate::utils::percentage;
use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Tried in order; the first that yields a usable choice wins.
const PAGE_SIZE_CONTROLS: &[&str] = &[
    r#"select[aria-label*="Items per page"]"#,
    r#"select[aria-label*="عدد العناصر"]"#,
    ".ms-Dropdown-title",
    r#"[data-automation-key="pageSize"]"#,
    r#"select:has(option[value="100"])"#,
    r#"select:has(option[value="200"])"#,
    ".ms-Dropdown",
];

const DROPDOWN_ITEMS: &[&str] = &[".ms-Dropdown-item", r#"[role="option"]"#];

/// Smallest offered size that holds `total`, else the largest offered.
pub fn choose_page_size(options: &[u32], total: usize) -> Option<u32> {
    options
        .iter()
        .copied()
        .filter(|o| *o as usize >= total)
        .min()
        .or_else(|| options.iter().copied().max())
}

#[derive(Debug)]
enum BulkPlan {
    Select { control: ElementHandle, value: String, size: u32 },
    Dropdown { trigger: ElementHandle },
}

fn leading_number(s: &str) -> Option<u32> {
    let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn plan_bulk(doc: &Document, total: usize, page_size: u32) -> Option<BulkPlan> {
    for selector in PAGE_SIZE_CONTROLS {
        let Some(control) = doc.first_of(&[*selector]) else { continue };
        debug!("Page size control via {}", selector);

        if control.value().name() == "select" {
            let options: Vec<(String, u32)> = query_within(control, "option")
                .unwrap_or_default()
                .into_iter()
                .filter_map(|o| {
                    let value = o.value().attr("value").map(str::to_string)?;
                    let size = leading_number(&value)?;
                    Some((value, size))
                })
                .collect();
            let sizes: Vec<u32> = options.iter().map(|(_, s)| *s).collect();
            match choose_page_size(&sizes, total) {
                Some(size) if size > page_size => {
                    let value = options
                        .into_iter()
                        .find(|(_, s)| *s == size)
                        .map(|(v, _)| v)
                        .unwrap_or_else(|| size.to_string());
                    return Some(BulkPlan::Select {
                        control: ElementHandle::of(control),
                        value,
                        size,
                    });
                }
                _ => debug!("Select offers nothing above {} per page", page_size),
            }
        } else if has_class(control, "ms-Dropdown") || has_class(control, "ms-Dropdown-title") {
            return Some(BulkPlan::Dropdown {
                trigger: ElementHandle::of(control),
            });
        }
    }
    None
}

/// The numerically largest item of an open dropdown, if it beats the current size.
fn largest_dropdown_item(doc: &Document, page_size: u32) -> Option<(ElementHandle, u32)> {
    doc.query_any(DROPDOWN_ITEMS)
        .into_iter()
        .filter_map(|item| leading_number(&text_of(item)).map(|n| (item, n)))
        .max_by_key(|(_, n)| *n)
        .filter(|(_, n)| *n > page_size)
        .map(|(item, n)| (ElementHandle::of(item), n))
}

fn progress_message(page: u32, total_pages: u32, processed: usize, expected: usize) -> String {
    format!(
        "Processing page {} of {}... ({}/{} invoices)",
        page, total_pages, processed, expected
    )
}

impl<S: ListingSurface> Harvester<S> {
    /// Collect every record of every page.
    ///
    /// Never fails outward: a concurrent request, a broken page or a dead surface all
    /// end in a result with `success == false` or a partial dataset and a reason.
    pub async fn collect_all_pages(
        &self,
        options: &AcquisitionOptions,
        progress: Option<&UnboundedSender<ProgressSnapshot>>,
    ) -> AcquisitionResult {
        let guard = match self.begin_acquisition() {
            Ok(guard) => guard,
            Err(e) => {
                warn!("{}", e);
                return failed(e.to_string(), Vec::new(), 0);
            }
        };
        let progress = progress.filter(|_| options.progress);

        let baseline = match self.scan_page().await {
            Ok(data) => data,
            Err(e) => return failed(e.to_string(), Vec::new(), 0),
        };
        let expected = baseline.total_count;
        info!(
            "Collecting all pages: {} invoices expected over {} pages",
            expected, baseline.total_pages
        );

        match self.bulk_attempt(&baseline).await {
            Ok(Some(records))
                if records.len() as f64 >= expected as f64 * self.config.bulk_acceptance_threshold =>
            {
                info!("Bulk page size delivered {} of {} invoices", records.len(), expected);
                return finished(records, expected, None);
            }
            Ok(Some(records)) => info!(
                "Bulk page size delivered only {} of {}, traversing pages",
                records.len(),
                expected
            ),
            Ok(None) => debug!("No usable page size control"),
            Err(e) => warn!("Bulk page size attempt failed: {}", e),
        }

        self.traverse(&guard, progress).await
    }

    async fn bulk_attempt(&self, baseline: &CurrentPageData) -> Result<Option<Vec<Record>>> {
        let snapshot = self.surface.snapshot().await?;
        let plan = {
            let doc = Document::parse(&snapshot);
            plan_bulk(&doc, baseline.total_count, baseline.page_size)
        };

        match plan {
            None => return Ok(None),
            Some(BulkPlan::Select { control, value, size }) => {
                info!("Setting page size to {}", size);
                self.surface.select_value(&control, &value).await?;
                self.surface.dispatch(&control, UiSignal::Change).await?;
            }
            Some(BulkPlan::Dropdown { trigger }) => {
                self.surface.click(&trigger).await?;
                sleep(self.config.dropdown_open_delay()).await;
                let opened = self.surface.snapshot().await?;
                let item = {
                    let doc = Document::parse(&opened);
                    largest_dropdown_item(&doc, baseline.page_size)
                };
                let Some((item, size)) = item else {
                    debug!("Dropdown offers nothing above {} per page", baseline.page_size);
                    return Ok(None);
                };
                info!("Choosing {} items per page", size);
                self.surface.click(&item).await?;
            }
        }

        sleep(self.config.settle_delay()).await;
        self.wait_for_page_load().await;
        let data = self.scan_page().await?;

        let records = data
            .invoices
            .into_iter()
            .enumerate()
            .map(|(i, mut r)| {
                r.page_number = 1;
                r.serial_number = i + 1;
                r.global_index = Some(i + 1);
                r
            })
            .collect();
        Ok(Some(records))
    }

    async fn traverse(
        &self,
        guard: &AcquisitionGuard<'_>,
        progress: Option<&UnboundedSender<ProgressSnapshot>>,
    ) -> AcquisitionResult {
        guard.enter_traversal();

        if let Err(e) = self.navigate_to_page(1).await {
            warn!("Could not return to page 1: {}", e);
        }
        self.wait_for_page_load().await;

        let start = match self.scan_page().await {
            Ok(data) => data,
            Err(e) => return failed(e.to_string(), Vec::new(), 0),
        };
        let (total_pages, page_size, expected) =
            (start.total_pages, start.page_size as usize, start.total_count);

        let mut collected: Vec<Record> = Vec::with_capacity(expected);
        let mut skipped = Vec::new();

        for page in 1..=total_pages {
            if let Some(tx) = progress {
                // Nobody listening is fine.
                let _ = tx.send(ProgressSnapshot {
                    current_page: page,
                    total_pages,
                    message: progress_message(page, total_pages, collected.len(), expected),
                    percentage: percentage(page, total_pages),
                });
            }

            match self.harvest_page(page).await {
                Ok(data) => {
                    let processed = collected.len();
                    let found = data.invoices.len();
                    collected.extend(data.invoices.into_iter().enumerate().map(|(i, mut r)| {
                        r.page_number = page;
                        r.serial_number = (page as usize - 1) * page_size + i + 1;
                        r.global_index = Some(processed + i + 1);
                        r
                    }));
                    debug!(
                        "Page {} gave {} invoices ({}/{})",
                        page,
                        found,
                        collected.len(),
                        expected
                    );
                }
                Err(e) => {
                    warn!("Skipping page {}: {}", page, e);
                    skipped.push(page);
                }
            }

            if collected.len() >= expected {
                info!("Collected all {} expected invoices, stopping at page {}", expected, page);
                break;
            }
        }

        let error = (!skipped.is_empty()).then(|| {
            let pages: Vec<String> = skipped.iter().map(u32::to_string).collect();
            format!("Skipped pages: {}", pages.join(", "))
        });
        finished(collected, expected, error)
    }

    /// Scan `page`, refusing records from whatever page the listing actually landed on.
    async fn harvest_page(&self, page: u32) -> Result<CurrentPageData> {
        if self.navigate_to_page(page).await? {
            sleep(self.config.page_settle_delay()).await;
            self.wait_for_page_load().await;
        }
        let data = self.scan_page().await?;
        if data.current_page != page {
            return Err(HarvestError::WrongPage {
                target: page,
                shown: data.current_page,
            });
        }
        Ok(data)
    }
}

fn finished(data: Vec<Record>, expected: usize, error: Option<String>) -> AcquisitionResult {
    AcquisitionResult {
        success: !data.is_empty() || expected == 0,
        total_processed: data.len(),
        data,
        expected_total: expected,
        error,
        finished_at: Utc::now().naive_utc(),
    }
}

fn failed(error: String, data: Vec<Record>, expected: usize) -> AcquisitionResult {
    AcquisitionResult {
        success: false,
        total_processed: data.len(),
        data,
        expected_total: expected,
        error: Some(error),
        finished_at: Utc::now().naive_utc(),
    }
}
