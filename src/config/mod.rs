use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub harvester: HarvestConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub webdriver: WebDriverConfig,
}

/// Engine tuning: tax rate, delays, poll bounds and acceptance heuristics.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HarvestConfig {
    #[serde(default = "default_vat_rate")]
    pub vat_rate: f64,

    /// Wait after a page-size change before polling for the reload.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Wait after navigating to another page.
    #[serde(default = "default_page_settle_delay_ms")]
    pub page_settle_delay_ms: u64,

    #[serde(default = "default_dropdown_open_delay_ms")]
    pub dropdown_open_delay_ms: u64,

    #[serde(default = "default_navigation_step_delay_ms")]
    pub navigation_step_delay_ms: u64,

    #[serde(default = "default_condition_poll_interval_ms")]
    pub condition_poll_interval_ms: u64,

    #[serde(default = "default_condition_timeout_ms")]
    pub condition_timeout_ms: u64,

    #[serde(default = "default_stability_delay_ms")]
    pub stability_delay_ms: u64,

    /// Fraction of the expected total a bulk page-size expansion must deliver.
    #[serde(default = "default_bulk_acceptance_threshold")]
    pub bulk_acceptance_threshold: f64,

    #[serde(default = "default_rescan_debounce_ms")]
    pub rescan_debounce_ms: u64,

    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Max distance (in pages) covered by next/previous stepping.
    #[serde(default = "default_step_navigation_window")]
    pub step_navigation_window: u32,

    #[serde(default = "default_currency")]
    pub default_currency: String,

    #[serde(default = "default_portal_base_url")]
    pub portal_base_url: String,
}

/// HTTP fetch settings for static snapshots
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// WebDriver session settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebDriverConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default = "default_mutation_poll_ms")]
    pub mutation_poll_ms: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_vat_rate() -> f64 {
    0.14
}
fn default_settle_delay_ms() -> u64 {
    3000
}
fn default_page_settle_delay_ms() -> u64 {
    1000
}
fn default_dropdown_open_delay_ms() -> u64 {
    500
}
fn default_navigation_step_delay_ms() -> u64 {
    800
}
fn default_condition_poll_interval_ms() -> u64 {
    300
}
fn default_condition_timeout_ms() -> u64 {
    15_000
}
fn default_stability_delay_ms() -> u64 {
    1000
}
fn default_bulk_acceptance_threshold() -> f64 {
    0.9
}
fn default_rescan_debounce_ms() -> u64 {
    500
}
fn default_page_size() -> u32 {
    50
}
fn default_step_navigation_window() -> u32 {
    5
}
fn default_currency() -> String {
    "EGP".to_string()
}
fn default_portal_base_url() -> String {
    "https://invoicing.eta.gov.eg".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    500
}
fn default_user_agent() -> String {
    "eta-invoice-harvester/0.1".to_string()
}
fn default_server_url() -> String {
    "http://localhost:4444".to_string()
}
fn default_mutation_poll_ms() -> u64 {
    500
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            vat_rate: default_vat_rate(),
            settle_delay_ms: default_settle_delay_ms(),
            page_settle_delay_ms: default_page_settle_delay_ms(),
            dropdown_open_delay_ms: default_dropdown_open_delay_ms(),
            navigation_step_delay_ms: default_navigation_step_delay_ms(),
            condition_poll_interval_ms: default_condition_poll_interval_ms(),
            condition_timeout_ms: default_condition_timeout_ms(),
            stability_delay_ms: default_stability_delay_ms(),
            bulk_acceptance_threshold: default_bulk_acceptance_threshold(),
            rescan_debounce_ms: default_rescan_debounce_ms(),
            default_page_size: default_page_size(),
            step_navigation_window: default_step_navigation_window(),
            default_currency: default_currency(),
            portal_base_url: default_portal_base_url(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            mutation_poll_ms: default_mutation_poll_ms(),
        }
    }
}

impl HarvestConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
    pub fn page_settle_delay(&self) -> Duration {
        Duration::from_millis(self.page_settle_delay_ms)
    }
    pub fn dropdown_open_delay(&self) -> Duration {
        Duration::from_millis(self.dropdown_open_delay_ms)
    }
    pub fn navigation_step_delay(&self) -> Duration {
        Duration::from_millis(self.navigation_step_delay_ms)
    }
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.condition_poll_interval_ms)
    }
    pub fn condition_timeout(&self) -> Duration {
        Duration::from_millis(self.condition_timeout_ms)
    }
    pub fn stability_delay(&self) -> Duration {
        Duration::from_millis(self.stability_delay_ms)
    }
    pub fn rescan_debounce(&self) -> Duration {
        Duration::from_millis(self.rescan_debounce_ms)
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("ETA").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|e| {
            tracing::warn!("Invalid configuration, using defaults: {}", e);
            AppConfig::default()
        });
        Ok(app_cfg)
    }
}
