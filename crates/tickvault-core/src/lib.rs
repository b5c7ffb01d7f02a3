//! Core contracts for tickvault.
//!
//! This crate contains:
//! - Domain models, the business-day calendar and archive row layout
//! - Date-windowed test-issue classification rules
//! - The concurrent reference-data and trade backfill and its day archives
//! - The live trade filter
//! - Provider traits, Polygon adapters and their HTTP/retry/throttle plumbing

pub mod adapters;
pub mod archive;
pub mod backfill;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod live;
pub mod provider;
pub mod retry;
pub mod rules;
pub mod throttling;

pub use adapters::{PolygonAdapter, PolygonStream};
pub use archive::{archive_path, archived_tickers, partial_path, ArchiveError, ArchiveWriter};
pub use backfill::{Backfill, BackfillError, BackfillSummary, DayFetcher, DayResult, DayStatus};
pub use config::{load_dotenv, BackfillConfig, ProviderConfig};
pub use domain::{
    format_date, is_weekday, parse_date, today_utc, Address, Branding, DateRange, EndBound,
    TickerRecord, TickerSummary, TradeEvent, Weekdays, TICKER_COLUMNS, TRADE_COLUMNS,
};
pub use error::{ConfigError, ValidationError};
pub use http_client::{HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use live::{run_live, BatchOutcome, LiveError, LiveFilter};
pub use provider::{
    ProviderError, ProviderErrorKind, ProviderFuture, ReferenceDataProvider, TradeBatchStream,
    TradeFeed,
};
pub use retry::{Backoff, RetryConfig};
pub use rules::{ClassificationRule, RuleError, RuleSet, ValidityWindow, SUFFIX_GRAMMAR};
pub use throttling::RequestThrottle;
