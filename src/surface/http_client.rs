use crate::config::FetchConfig;
use crate::error::SurfaceError;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};
use url::Url;

pub struct HttpClient {
    inner: reqwest::Client,
    config: FetchConfig,
}

impl HttpClient {
    pub fn new(config: &FetchConfig) -> Result<Self, SurfaceError> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Portal pages sit behind a session cookie
            .cookie_store(true)
            .build()?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// Fetch a URL as text, retrying transient failures with jittered backoff.
    pub async fn get_text(&self, url: &Url) -> Result<String, SurfaceError> {
        // 2^n * factor: base, 2*base, 4*base ...
        let strategy = ExponentialBackoff::from_millis(2)
            .factor((self.config.retry_base_ms / 2).max(1))
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.config.max_retries as usize);

        let client = self;
        let mut attempt = 0u32;
        RetryIf::spawn(
            strategy,
            move || {
                attempt += 1;
                debug!("GET {} (attempt {})", url, attempt);
                client.fetch_once(url)
            },
            |e: &SurfaceError| {
                let retry = is_transient(e);
                if retry {
                    warn!("Fetch of {} failed, retrying: {}", url, e);
                }
                retry
            },
        )
        .await
    }

    async fn fetch_once(&self, url: &Url) -> Result<String, SurfaceError> {
        let resp = self.inner.get(url.clone()).send().await?.error_for_status()?;
        Ok(resp.text().await?)
    }
}

/// Connection problems, timeouts, 429 and 5xx are worth another try.
fn is_transient(e: &SurfaceError) -> bool {
    match e {
        SurfaceError::Http(err) => match err.status() {
            Some(status) => status.as_u16() == 429 || status.is_server_error(),
            None => true,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds_from_defaults() {
        assert!(HttpClient::new(&FetchConfig::default()).is_ok());
    }

    #[test]
    fn test_unsupported_is_not_retried() {
        assert!(!is_transient(&SurfaceError::Unsupported("click")));
    }
}
