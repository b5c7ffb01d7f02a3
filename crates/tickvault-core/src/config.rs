//! Runtime configuration.
//!
//! # Environment Variables
//!
//! - `POLYGON_API_KEY` (or legacy `POLYGON_KEY`): API key, required
//! - `POLYGON_REST_URL`: REST base URL (default: <https://api.polygon.io>)
//! - `POLYGON_STREAM_URL`: WebSocket URL (default: <wss://socket.polygon.io/stocks>)
//!
//! A `.env` file in the working directory or any ancestor is honored.

use std::path::PathBuf;

use tokio::sync::Semaphore;

use crate::error::{ConfigError, ValidationError};

pub const DEFAULT_REST_URL: &str = "https://api.polygon.io";
pub const DEFAULT_STREAM_URL: &str = "wss://socket.polygon.io/stocks";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_RETRIES: u32 = 20;
pub const DEFAULT_RATE_LIMIT: u32 = 100;

pub const DEFAULT_OUTDIR: &str = "tickers";
pub const DEFAULT_TRADES_OUTDIR: &str = "trades";
pub const DEFAULT_MARKET: &str = "stocks";
pub const DEFAULT_PAGE_LIMIT: u32 = 1000;
pub const DEFAULT_DAY_CONCURRENCY: usize = 5;
pub const DEFAULT_TICKER_CONCURRENCY: usize = 50;

const API_KEY_VARS: [&str; 2] = ["POLYGON_API_KEY", "POLYGON_KEY"];

/// Loads `.env` from the working directory or the nearest ancestor that has one.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Connection settings shared by the REST and streaming adapters.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub rest_url: String,
    pub stream_url: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    /// Requests per second across all workers. `0` disables throttling.
    pub rate_limit: u32,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            rest_url: String::from(DEFAULT_REST_URL),
            stream_url: String::from(DEFAULT_STREAM_URL),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit: DEFAULT_RATE_LIMIT,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = API_KEY_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .map(|value| value.trim().to_owned())
            .find(|value| !value.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let mut config = Self::new(api_key);
        if let Some(url) = non_empty(lookup("POLYGON_REST_URL")) {
            config.rest_url = with_scheme("POLYGON_REST_URL", url, &["http://", "https://"])?
                .trim_end_matches('/')
                .to_owned();
        }
        if let Some(url) = non_empty(lookup("POLYGON_STREAM_URL")) {
            config.stream_url = with_scheme("POLYGON_STREAM_URL", url, &["ws://", "wss://"])?;
        }
        Ok(config)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: u32) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("rest_url", &self.rest_url)
            .field("stream_url", &self.stream_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

fn with_scheme(name: &'static str, url: String, schemes: &[&str]) -> Result<String, ConfigError> {
    if schemes.iter().any(|scheme| url.starts_with(scheme)) {
        Ok(url)
    } else {
        Err(ConfigError::InvalidValue { name, value: url })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Settings of a backfill run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillConfig {
    pub outdir: PathBuf,
    /// Also archive each day's trades here, for the tickers that survive the
    /// reference pass.
    pub trades_outdir: Option<PathBuf>,
    /// Re-fetch days whose archive already exists.
    pub force: bool,
    pub day_concurrency: usize,
    pub ticker_concurrency: usize,
    pub market: String,
    pub page_limit: u32,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            outdir: PathBuf::from(DEFAULT_OUTDIR),
            trades_outdir: None,
            force: false,
            day_concurrency: DEFAULT_DAY_CONCURRENCY,
            ticker_concurrency: DEFAULT_TICKER_CONCURRENCY,
            market: String::from(DEFAULT_MARKET),
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl BackfillConfig {
    pub fn new(outdir: impl Into<PathBuf>) -> Self {
        Self {
            outdir: outdir.into(),
            ..Self::default()
        }
    }

    pub fn with_trades_outdir(mut self, trades_outdir: impl Into<PathBuf>) -> Self {
        self.trades_outdir = Some(trades_outdir.into());
        self
    }

    /// Checks the pool widths fit a semaphore and the listing parameters are usable.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, width) in [
            ("day_concurrency", self.day_concurrency),
            ("ticker_concurrency", self.ticker_concurrency),
        ] {
            if width == 0 {
                return Err(ValidationError::ZeroValue { field });
            }
            if width > Semaphore::MAX_PERMITS {
                return Err(ValidationError::TooLarge {
                    field,
                    max: Semaphore::MAX_PERMITS,
                });
            }
        }
        if self.page_limit == 0 {
            return Err(ValidationError::ZeroValue {
                field: "page_limit",
            });
        }
        if self.market.trim().is_empty() {
            return Err(ValidationError::EmptyMarket);
        }
        Ok(())
    }
}
