//! Live browser session over WebDriver.

use super::{ListingSurface, Snapshot, UiSignal};
use crate::config::WebDriverConfig;
use crate::dom::ElementHandle;
use crate::error::SurfaceError;
use crate::observer::MutationRecord;
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Marks every element that is not rendered so snapshots carry computed visibility.
const STAMP_VISIBILITY: &str = r#"
for (const el of document.querySelectorAll('body *')) {
  const r = el.getBoundingClientRect();
  const s = window.getComputedStyle(el);
  if (r.width === 0 || r.height === 0 || s.display === 'none' ||
      s.visibility === 'hidden' || s.opacity === '0') {
    el.setAttribute('data-rendered-hidden', '1');
  } else {
    el.removeAttribute('data-rendered-hidden');
  }
}
return true;
"#;

/// Installs the in-page recorder if missing, then hands over and clears what it queued.
const DRAIN_MUTATIONS: &str = r#"
if (!window.__harvestMutations) {
  window.__harvestMutations = [];
  new MutationObserver((mutations) => {
    for (const m of mutations) {
      if (m.type !== 'childList') continue;
      const added = [];
      m.addedNodes.forEach((n) => { if (n.nodeType === 1) added.push(n.outerHTML); });
      if (added.length) window.__harvestMutations.push(added);
    }
  }).observe(document.body, { childList: true, subtree: true });
}
const out = window.__harvestMutations;
window.__harvestMutations = [];
return out;
"#;

const DISPATCH_EVENT: &str =
    "arguments[0].dispatchEvent(new Event(arguments[1], { bubbles: true })); return true;";

const ENTER_KEY: &str = "\u{E007}";

pub struct WebDriverSurface {
    client: Client,
}

impl WebDriverSurface {
    pub async fn connect(config: &WebDriverConfig) -> Result<Self, SurfaceError> {
        info!("Connecting to WebDriver at {}", config.server_url);
        let client = ClientBuilder::native().connect(&config.server_url).await?;
        Ok(Self { client })
    }

    pub async fn open(&self, url: &str) -> Result<(), SurfaceError> {
        info!("Opening {}", url);
        self.client.goto(url).await?;
        Ok(())
    }

    /// End the browser session. Clones of the client share it, so this ends it for all.
    pub async fn close(&self) -> Result<(), SurfaceError> {
        self.client.clone().close().await?;
        Ok(())
    }

    async fn find(&self, target: &ElementHandle) -> Result<Element, SurfaceError> {
        self.client
            .find(Locator::XPath(&target.xpath))
            .await
            .map_err(|e| {
                if e.is_no_such_element() {
                    SurfaceError::ElementNotFound(target.xpath.clone())
                } else {
                    e.into()
                }
            })
    }

    /// Poll the page's mutation recorder every `every` and forward added-node batches.
    pub fn watch_mutations(&self, every: Duration) -> (mpsc::Receiver<MutationRecord>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let client = self.client.clone();
        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tick.tick().await;
                let drained = match client.execute(DRAIN_MUTATIONS, vec![]).await {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("Mutation drain failed: {}", e);
                        continue;
                    }
                };
                for record in parse_batches(drained) {
                    if tx.send(record).await.is_err() {
                        return;
                    }
                }
            }
        });
        (rx, task)
    }
}

fn parse_batches(value: Value) -> Vec<MutationRecord> {
    let Value::Array(batches) = value else { return Vec::new() };
    batches
        .into_iter()
        .filter_map(|batch| match batch {
            Value::Array(nodes) => Some(MutationRecord {
                added: nodes
                    .into_iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect(),
            }),
            _ => None,
        })
        .filter(|r| !r.added.is_empty())
        .collect()
}

#[async_trait]
impl ListingSurface for WebDriverSurface {
    async fn snapshot(&self) -> Result<Snapshot, SurfaceError> {
        if let Err(e) = self.client.execute(STAMP_VISIBILITY, vec![]).await {
            warn!("Visibility stamping failed: {}", e);
        }
        let html = self.client.source().await?;
        let url = self.client.current_url().await.ok();
        Ok(Snapshot::new(html, url))
    }

    async fn click(&self, target: &ElementHandle) -> Result<(), SurfaceError> {
        debug!("click {} {:?}", target.xpath, target.text);
        self.find(target).await?.click().await?;
        Ok(())
    }

    async fn select_value(&self, target: &ElementHandle, value: &str) -> Result<(), SurfaceError> {
        self.find(target).await?.select_by_value(value).await?;
        Ok(())
    }

    async fn set_value(&self, target: &ElementHandle, value: &str) -> Result<(), SurfaceError> {
        let el = self.find(target).await?;
        el.clear().await?;
        el.send_keys(value).await?;
        Ok(())
    }

    async fn dispatch(&self, target: &ElementHandle, signal: UiSignal) -> Result<(), SurfaceError> {
        let el = self.find(target).await?;
        match signal {
            UiSignal::EnterKey => el.send_keys(ENTER_KEY).await?,
            UiSignal::Input | UiSignal::Change => {
                let args = vec![serde_json::to_value(&el)?, json!(signal.event_name())];
                self.client.execute(DISPATCH_EVENT, args).await?;
            }
        }
        Ok(())
    }
}
