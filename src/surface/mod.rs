pub mod http_client;
pub mod snapshot;
pub mod webdriver;

#[cfg(test)]
pub mod simulated;

use crate::dom::ElementHandle;
use crate::error::SurfaceError;
use async_trait::async_trait;
use url::Url;

pub use self::snapshot::SnapshotSurface;
pub use self::webdriver::WebDriverSurface;

/// Rendered markup of the listing at one instant.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub html: String,
    pub url: Option<Url>,
}

impl Snapshot {
    pub fn new(html: String, url: Option<Url>) -> Self {
        Self { html, url }
    }
}

/// Synthetic signals fired at a control after its value changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiSignal {
    Input,
    Change,
    EnterKey,
}

impl UiSignal {
    pub fn event_name(self) -> &'static str {
        match self {
            UiSignal::Input => "input",
            UiSignal::Change => "change",
            UiSignal::EnterKey => "keydown",
        }
    }
}

// ── Surface trait ─────────────────────────────────────────────────────────────

/// The live listing the engine reads and drives. The surface owns the page; the
/// engine only observes snapshots and triggers controls.
#[async_trait]
pub trait ListingSurface: Send + Sync {
    async fn snapshot(&self) -> Result<Snapshot, SurfaceError>;
    async fn click(&self, target: &ElementHandle) -> Result<(), SurfaceError>;
    async fn select_value(&self, target: &ElementHandle, value: &str) -> Result<(), SurfaceError>;
    async fn set_value(&self, target: &ElementHandle, value: &str) -> Result<(), SurfaceError>;
    async fn dispatch(&self, target: &ElementHandle, signal: UiSignal) -> Result<(), SurfaceError>;
}
