//! The extraction engine bound to one loaded listing.
//!
//! A [`Harvester`] owns the current page's records and pagination state and is the
//! single authority over the acquisition phase. Everything it reads comes from
//! snapshots of a [`ListingSurface`]; every snapshot is parsed synchronously and
//! dropped before the next await.

mod acquisition;
mod navigation;
mod wait;

use crate::config::HarvestConfig;
use crate::dom::Document;
use crate::error::{HarvestError, Result};
use crate::extract::{extract_line_items, extract_records, summary_line_item};
use crate::models::{CurrentPageData, LineItem, PaginationState, Record};
use crate::pagination;
use crate::surface::{ListingSurface, Snapshot};
use chrono::{NaiveDateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Where a full-dataset acquisition stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionPhase {
    Idle,
    BulkAttempt,
    PageTraversal,
    Done,
}

impl AcquisitionPhase {
    pub fn is_running(self) -> bool {
        matches!(self, Self::BulkAttempt | Self::PageTraversal)
    }
}

#[derive(Debug, Default)]
struct PageState {
    invoices: Vec<Record>,
    pagination: PaginationState,
    scanned_at: Option<NaiveDateTime>,
}

pub struct Harvester<S> {
    surface: Arc<S>,
    config: HarvestConfig,
    page: Mutex<PageState>,
    phase: Mutex<AcquisitionPhase>,
}

/// Proof that an acquisition is running. Only the holder can move the phase forward;
/// dropping it ends the run on every path.
pub struct AcquisitionGuard<'a> {
    phase: &'a Mutex<AcquisitionPhase>,
}

impl AcquisitionGuard<'_> {
    pub fn enter_traversal(&self) {
        *lock(self.phase) = AcquisitionPhase::PageTraversal;
    }
}

impl Drop for AcquisitionGuard<'_> {
    fn drop(&mut self) {
        *lock(self.phase) = AcquisitionPhase::Done;
        debug!("Acquisition finished");
    }
}

/// A poisoned lock only means a panic elsewhere; the state itself is still whole.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl<S: ListingSurface> Harvester<S> {
    pub fn new(surface: Arc<S>, config: HarvestConfig) -> Self {
        Self {
            surface,
            config,
            page: Mutex::new(PageState::default()),
            phase: Mutex::new(AcquisitionPhase::Idle),
        }
    }

    pub fn phase(&self) -> AcquisitionPhase {
        *lock(&self.phase)
    }

    pub fn is_acquiring(&self) -> bool {
        self.phase().is_running()
    }

    /// Claim the acquisition slot. A second claim while one is running is rejected.
    pub fn begin_acquisition(&self) -> Result<AcquisitionGuard<'_>> {
        let mut phase = lock(&self.phase);
        if phase.is_running() {
            return Err(HarvestError::AcquisitionInProgress);
        }
        *phase = AcquisitionPhase::BulkAttempt;
        Ok(AcquisitionGuard { phase: &self.phase })
    }

    /// The last scan's records and pagination.
    pub fn current_data(&self) -> CurrentPageData {
        let page = lock(&self.page);
        CurrentPageData {
            invoices: page.invoices.clone(),
            total_count: page.pagination.total_count,
            current_page: page.pagination.current_page,
            total_pages: page.pagination.total_pages,
            page_size: page.pagination.page_size,
            scanned_at: page.scanned_at,
        }
    }

    pub fn has_scanned(&self) -> bool {
        lock(&self.page).scanned_at.is_some()
    }

    /// Recompute the current page from scratch. A snapshot failure is logged and the
    /// previous state is kept.
    pub async fn rescan(&self) -> CurrentPageData {
        if let Err(e) = self.scan_page().await {
            warn!("Rescan failed: {}", e);
        }
        self.current_data()
    }

    pub(crate) async fn scan_page(&self) -> Result<CurrentPageData> {
        let snapshot = self.surface.snapshot().await?;
        let (invoices, pagination) = self.read_snapshot(&snapshot);
        info!(
            "Scanned page {}/{}: {} invoices (total {})",
            pagination.current_page,
            pagination.total_pages,
            invoices.len(),
            pagination.total_count
        );
        {
            let mut page = lock(&self.page);
            page.invoices = invoices;
            page.pagination = pagination;
            page.scanned_at = Some(Utc::now().naive_utc());
        }
        Ok(self.current_data())
    }

    fn read_snapshot(&self, snapshot: &Snapshot) -> (Vec<Record>, PaginationState) {
        let doc = Document::parse(snapshot);
        let mut invoices = extract_records(&doc, 1, &self.config);
        let state = pagination::estimate(&doc, invoices.len(), self.config.default_page_size);
        for record in &mut invoices {
            record.page_number = state.current_page;
        }
        (invoices, state)
    }

    /// Line items for one invoice of the current page, keyed by electronic or internal
    /// number. Without a detail table the record's own totals become one summary item.
    pub async fn invoice_details(&self, invoice_id: &str) -> Result<Vec<LineItem>> {
        let snapshot = self.surface.snapshot().await?;
        let mut items = {
            let doc = Document::parse(&snapshot);
            extract_line_items(&doc)
        };

        let mut page = lock(&self.page);
        let record = page
            .invoices
            .iter_mut()
            .find(|r| r.electronic_number == invoice_id || r.internal_number == invoice_id);
        match record {
            Some(record) => {
                if items.is_empty() {
                    debug!("No detail table for {}, using summary item", invoice_id);
                    items.push(summary_line_item(record));
                }
                record.details = items.clone();
            }
            None => warn!("Invoice {} is not on the current page", invoice_id),
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::simulated::{SimulatedListing, fast_config};

    #[tokio::test]
    async fn test_rescan_overwrites_state() {
        let sim = Arc::new(SimulatedListing::new(150, 50));
        let harvester = Harvester::new(sim.clone(), fast_config());
        assert!(!harvester.has_scanned());

        let data = harvester.rescan().await;
        assert_eq!(data.invoices.len(), 50);
        assert_eq!(data.total_pages, 3);
        assert_eq!(data.total_count, 150);
        assert_eq!(data.current_page, 1);
        assert_eq!(data.invoices[0].electronic_number, format!("EN{:018}", 1));
        assert!(data.scanned_at.is_some());
    }

    #[tokio::test]
    async fn test_guard_rejects_second_acquisition_and_resets_on_drop() {
        let sim = Arc::new(SimulatedListing::new(10, 10));
        let harvester = Harvester::new(sim, fast_config());
        assert_eq!(harvester.phase(), AcquisitionPhase::Idle);

        let guard = harvester.begin_acquisition().unwrap();
        assert!(harvester.is_acquiring());
        assert!(matches!(
            harvester.begin_acquisition(),
            Err(HarvestError::AcquisitionInProgress)
        ));
        guard.enter_traversal();
        assert_eq!(harvester.phase(), AcquisitionPhase::PageTraversal);
        drop(guard);

        assert_eq!(harvester.phase(), AcquisitionPhase::Done);
        assert!(harvester.begin_acquisition().is_ok());
    }

    #[tokio::test]
    async fn test_details_fall_back_to_summary_item() {
        let sim = Arc::new(SimulatedListing::new(5, 5));
        let harvester = Harvester::new(sim, fast_config());
        harvester.rescan().await;

        let id = format!("EN{:018}", 2);
        let items = harvester.invoice_details(&id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit_price, "1,140.00 EGP");
        assert_eq!(items[0].total_value, "1,000.00");
        let stored = harvester.current_data();
        assert_eq!(stored.invoices[1].details, items);

        assert!(harvester.invoice_details("missing").await.unwrap().is_empty());
    }
}
