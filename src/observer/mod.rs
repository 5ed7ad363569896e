//! Debounced rescans driven by structural changes of the listing.

use crate::dom::has_class;
use crate::harvester::Harvester;
use crate::surface::ListingSurface;
use scraper::{ElementRef, Html};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

/// Elements added to the document by one batch of mutations (outer HTML each).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationRecord {
    pub added: Vec<String>,
}

impl MutationRecord {
    /// Whether any added element is, or contains, a listing row.
    pub fn touches_rows(&self) -> bool {
        self.added.iter().any(|fragment| adds_row(fragment))
    }
}

fn adds_row(fragment: &str) -> bool {
    let html = Html::parse_fragment(fragment);
    html.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(|el| has_class(el, "ms-DetailsRow") || has_class(el, "ms-List-cell"))
}

/// Owns the observer task. Dropping it or calling [`ChangeObserver::detach`] cancels the
/// subscription and any pending rescan.
pub struct ChangeObserver {
    task: Option<JoinHandle<()>>,
}

impl ChangeObserver {
    pub fn attach<S>(
        harvester: Arc<Harvester<S>>,
        mut mutations: mpsc::Receiver<MutationRecord>,
        debounce: Duration,
    ) -> Self
    where
        S: ListingSurface + 'static,
    {
        let task = tokio::spawn(async move {
            let mut deadline: Option<Instant> = None;
            loop {
                tokio::select! {
                    batch = mutations.recv() => {
                        let Some(batch) = batch else { break };
                        if batch.touches_rows() && !harvester.is_acquiring() {
                            deadline = Some(Instant::now() + debounce);
                        }
                    }
                    _ = wait_for(deadline) => {
                        deadline = None;
                        if harvester.is_acquiring() {
                            debug!("Rescan suppressed during acquisition");
                            continue;
                        }
                        let data = harvester.rescan().await;
                        debug!("Observer rescan: {} invoices", data.invoices.len());
                    }
                }
            }
            debug!("Mutation stream closed, observer stopped");
        });
        info!("Change observer attached");
        Self { task: Some(task) }
    }

    pub fn detach(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Change observer detached");
        }
    }
}

impl Drop for ChangeObserver {
    fn drop(&mut self) {
        self.detach();
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::simulated::{SimulatedListing, fast_config};

    fn row_batch() -> MutationRecord {
        MutationRecord {
            added: vec![r#"<div class="ms-List-cell"><div class="ms-DetailsRow" role="row"></div></div>"#.into()],
        }
    }

    #[test]
    fn test_relevance() {
        assert!(row_batch().touches_rows());
        let nested = MutationRecord {
            added: vec![r#"<section><div class="ms-DetailsRow"></div></section>"#.into()],
        };
        assert!(nested.touches_rows());
        let other = MutationRecord {
            added: vec![r#"<span class="tooltip">hi</span>"#.into()],
        };
        assert!(!other.touches_rows());
    }

    #[tokio::test]
    async fn test_bursts_collapse_into_one_rescan() {
        let sim = Arc::new(SimulatedListing::new(30, 10));
        let harvester = Arc::new(Harvester::new(sim.clone(), fast_config()));
        let (tx, rx) = mpsc::channel(16);
        let mut observer = ChangeObserver::attach(harvester.clone(), rx, Duration::from_millis(40));

        for _ in 0..3 {
            tx.send(row_batch()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sim.snapshot_count(), 1);
        assert_eq!(harvester.current_data().invoices.len(), 10);

        observer.detach();
    }

    #[tokio::test]
    async fn test_irrelevant_and_suppressed_mutations_do_not_rescan() {
        let sim = Arc::new(SimulatedListing::new(30, 10));
        let harvester = Arc::new(Harvester::new(sim.clone(), fast_config()));
        let (tx, rx) = mpsc::channel(16);
        let _observer = ChangeObserver::attach(harvester.clone(), rx, Duration::from_millis(20));

        tx.send(MutationRecord { added: vec!["<p>note</p>".into()] }).await.unwrap();
        {
            let _guard = harvester.begin_acquisition().unwrap();
            tx.send(row_batch()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(60)).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sim.snapshot_count(), 0);
    }

    #[tokio::test]
    async fn test_detach_cancels_pending_rescan() {
        let sim = Arc::new(SimulatedListing::new(30, 10));
        let harvester = Arc::new(Harvester::new(sim.clone(), fast_config()));
        let (tx, rx) = mpsc::channel(16);
        let mut observer = ChangeObserver::attach(harvester, rx, Duration::from_millis(50));

        tx.send(row_batch()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        observer.detach();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sim.snapshot_count(), 0);
    }
}
