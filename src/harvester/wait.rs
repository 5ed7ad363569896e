use super::Harvester;
use crate::dom::{Document, is_rendered};
use crate::extract::locate_rows;
use crate::surface::ListingSurface;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

const LOADING_INDICATORS: &[&str] = &[
    ".LoadingIndicator",
    ".ms-Spinner",
    r#"[class*="loading"]"#,
    r#"[class*="spinner"]"#,
    ".ms-Shimmer",
];

fn is_loading(doc: &Document) -> bool {
    doc.query_any(LOADING_INDICATORS).into_iter().any(is_rendered)
}

fn has_rows(doc: &Document) -> bool {
    !locate_rows(doc).is_empty()
}

impl<S: ListingSurface> Harvester<S> {
    /// Wait until loading indicators are gone and rows are present, then let the grid
    /// settle. Timing out is logged and otherwise ignored.
    pub(crate) async fn wait_for_page_load(&self) {
        if !self.wait_until("loading indicators to clear", |doc| !is_loading(doc)).await {
            warn!("Loading indicators still visible, continuing");
        }
        if !self.wait_until("rows to appear", has_rows).await {
            warn!("No rows rendered, continuing with what is there");
        }
        sleep(self.config.stability_delay()).await;
    }

    /// Poll snapshots until `ready` holds or the condition timeout passes.
    async fn wait_until<F>(&self, what: &str, ready: F) -> bool
    where
        F: Fn(&Document) -> bool + Send + Sync,
    {
        let deadline = Instant::now() + self.config.condition_timeout();
        loop {
            match self.surface.snapshot().await {
                Ok(snapshot) => {
                    let done = {
                        let doc = Document::parse(&snapshot);
                        ready(&doc)
                    };
                    if done {
                        return true;
                    }
                }
                Err(e) => debug!("Snapshot failed while waiting for {}: {}", what, e),
            }
            if Instant::now() >= deadline {
                debug!("Gave up waiting for {}", what);
                return false;
            }
            sleep(self.config.poll_interval()).await;
        }
    }
}
