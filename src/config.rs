//! Backfill configuration from environment variables
//!
//! Built once at startup and passed by reference into every component;
//! nothing below the binary reads the environment.

use crate::fetch::retry::RetryPolicy;
use crate::pipeline::windows::CoverageMode;
use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://apilist.tronscanapi.com/api";
pub const DEFAULT_DB_PATH: &str = "tron_data.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Account whose transactions are ingested
    pub wallet_address: String,

    /// Path to SQLite database file
    pub db_path: String,

    /// Tronscan API base URL (no trailing slash needed)
    pub api_base_url: String,

    /// Outbound proxy for all upstream requests
    pub proxy_url: Option<String>,

    /// Records requested per page
    pub page_size: u32,

    /// Courtesy delay between consecutive pages
    pub page_delay_ms: u64,

    /// Initial backfill window size in days
    pub window_days: i64,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    pub retry: RetryPolicy,

    pub coverage_mode: CoverageMode,
}

impl BackfillConfig {
    /// Defaults for everything except the account and database location
    pub fn new(wallet_address: impl Into<String>, db_path: impl Into<String>) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            db_path: db_path.into(),
            api_base_url: DEFAULT_API_URL.to_string(),
            proxy_url: None,
            page_size: 50,
            page_delay_ms: 500,
            window_days: 7,
            request_timeout_secs: 30,
            retry: RetryPolicy::default(),
            coverage_mode: CoverageMode::Presence,
        }
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `TRON_WALLET_ADDRESS` (required)
    /// - `SQLITE_DB_PATH` (default: tron_data.db)
    /// - `TRONSCAN_API_URL` (default: https://apilist.tronscanapi.com/api)
    /// - `TRON_PROXY_URL`, falling back to `HTTPS_PROXY` (default: none)
    /// - `BACKFILL_PAGE_SIZE` (default: 50)
    /// - `BACKFILL_PAGE_DELAY_MS` (default: 500)
    /// - `BACKFILL_WINDOW_DAYS` (default: 7)
    /// - `BACKFILL_COVERAGE_MODE` (default: presence, or ledger)
    /// - `FETCH_MAX_ATTEMPTS` (default: 3)
    /// - `FETCH_RETRY_MIN_MS` / `FETCH_RETRY_MAX_MS` (default: 1000 / 3000)
    /// - `FETCH_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let wallet_address = var("TRON_WALLET_ADDRESS")
            .ok_or_else(|| ConfigError::MissingVariable("TRON_WALLET_ADDRESS".to_string()))?;

        let db_path = var("SQLITE_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let mut config = Self::new(wallet_address, db_path);

        if let Some(url) = var("TRONSCAN_API_URL") {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue(
                    "TRONSCAN_API_URL must start with http:// or https://".to_string(),
                ));
            }
            config.api_base_url = url;
        }

        config.proxy_url = var("TRON_PROXY_URL").or_else(|| var("HTTPS_PROXY"));

        config.page_size = var("BACKFILL_PAGE_SIZE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.page_size);

        config.page_delay_ms = var("BACKFILL_PAGE_DELAY_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.page_delay_ms);

        config.window_days = var("BACKFILL_WINDOW_DAYS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.window_days);

        config.request_timeout_secs = var("FETCH_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.request_timeout_secs);

        let max_attempts = var("FETCH_MAX_ATTEMPTS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.retry.max_attempts);
        let min_delay_ms = var("FETCH_RETRY_MIN_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.retry.min_delay.as_millis() as u64);
        let max_delay_ms = var("FETCH_RETRY_MAX_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.retry.max_delay.as_millis() as u64);
        config.retry = RetryPolicy::new(
            max_attempts,
            Duration::from_millis(min_delay_ms),
            Duration::from_millis(max_delay_ms),
        );

        if let Some(mode) = var("BACKFILL_COVERAGE_MODE") {
            config.coverage_mode = match mode.to_lowercase().as_str() {
                "presence" => CoverageMode::Presence,
                "ledger" => CoverageMode::Ledger,
                _ => {
                    log::warn!(
                        "Invalid BACKFILL_COVERAGE_MODE '{}', defaulting to presence",
                        mode
                    );
                    CoverageMode::Presence
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wallet_address.is_empty() {
            return Err(ConfigError::InvalidValue(
                "wallet address cannot be empty".to_string(),
            ));
        }

        if self.page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "BACKFILL_PAGE_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.window_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "BACKFILL_WINDOW_DAYS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}
