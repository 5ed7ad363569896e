//! A fixed document: a saved page or one fetched over HTTP. It can be read but not driven.

use super::http_client::HttpClient;
use super::{ListingSurface, Snapshot, UiSignal};
use crate::config::FetchConfig;
use crate::dom::ElementHandle;
use crate::error::SurfaceError;
use async_trait::async_trait;
use std::path::Path;
use tracing::info;
use url::Url;

pub struct SnapshotSurface {
    snapshot: Snapshot,
}

impl SnapshotSurface {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub async fn from_file(path: &Path, url: Option<Url>) -> Result<Self, SurfaceError> {
        let html = tokio::fs::read_to_string(path).await?;
        info!("Loaded {} bytes from {:?}", html.len(), path);
        Ok(Self::new(Snapshot::new(html, url)))
    }

    pub async fn fetch(url: Url, config: &FetchConfig) -> Result<Self, SurfaceError> {
        let client = HttpClient::new(config)?;
        let html = client.get_text(&url).await?;
        info!("Fetched {} bytes from {}", html.len(), url);
        Ok(Self::new(Snapshot::new(html, Some(url))))
    }
}

#[async_trait]
impl ListingSurface for SnapshotSurface {
    async fn snapshot(&self) -> Result<Snapshot, SurfaceError> {
        Ok(self.snapshot.clone())
    }

    async fn click(&self, _target: &ElementHandle) -> Result<(), SurfaceError> {
        Err(SurfaceError::Unsupported("click"))
    }

    async fn select_value(&self, _target: &ElementHandle, _value: &str) -> Result<(), SurfaceError> {
        Err(SurfaceError::Unsupported("select"))
    }

    async fn set_value(&self, _target: &ElementHandle, _value: &str) -> Result<(), SurfaceError> {
        Err(SurfaceError::Unsupported("input"))
    }

    async fn dispatch(&self, _target: &ElementHandle, _signal: UiSignal) -> Result<(), SurfaceError> {
        Err(SurfaceError::Unsupported("event dispatch"))
    }
}
