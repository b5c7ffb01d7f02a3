//! Provider contracts consumed by the backfill and live pipelines.
//!
//! | Trait | Operations | Used by |
//! |-------|------------|---------|
//! | [`ReferenceDataProvider`] | `list_tickers`, `ticker_details`, `list_trades` | [`crate::backfill`] |
//! | [`TradeFeed`] | `subscribe` | [`crate::live`] |
//!
//! Both traits return boxed futures so implementations stay object safe and
//! can be shared as `Arc<dyn ...>` across worker tasks.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use futures_util::stream::BoxStream;
use time::Date;

use crate::domain::{TickerRecord, TickerSummary, TradeEvent};

/// Provider-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    NotFound,
    RateLimited,
    Unavailable,
    InvalidResponse,
    Unauthorized,
    Internal,
}

/// Structured provider error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
    retryable: bool,
}

impl ProviderError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::NotFound,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::InvalidResponse,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Unauthorized,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind, ProviderErrorKind::NotFound)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::NotFound => "provider.not_found",
            ProviderErrorKind::RateLimited => "provider.rate_limited",
            ProviderErrorKind::Unavailable => "provider.unavailable",
            ProviderErrorKind::InvalidResponse => "provider.invalid_response",
            ProviderErrorKind::Unauthorized => "provider.unauthorized",
            ProviderErrorKind::Internal => "provider.internal",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ProviderError {}

/// Boxed future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Stream of trade batches produced by a live subscription.
pub type TradeBatchStream<'a> = BoxStream<'a, Result<Vec<TradeEvent>, ProviderError>>;

/// Source of daily reference data and historical trades.
///
/// Implementations must be `Send + Sync`: one handle is shared by every day
/// and ticker worker of a backfill run.
pub trait ReferenceDataProvider: Send + Sync {
    /// Lists the full ticker universe for `as_of`, following pagination.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if any page cannot be fetched or decoded.
    fn list_tickers<'a>(
        &'a self,
        as_of: Date,
        market: &'a str,
        page_limit: u32,
    ) -> ProviderFuture<'a, Vec<TickerSummary>>;

    /// Fetches reference details of one ticker as of `as_of`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderErrorKind::NotFound`] when the provider has no record
    /// for the ticker on that day, other kinds for transport and decode failures.
    fn ticker_details<'a>(&'a self, ticker: &'a str, as_of: Date)
        -> ProviderFuture<'a, TickerRecord>;

    /// Lists every trade of one ticker on `date`, following pagination.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderErrorKind::NotFound`] when the provider knows no trades
    /// for the ticker on that day, other kinds for transport and decode failures.
    fn list_trades<'a>(&'a self, ticker: &'a str, date: Date) -> ProviderFuture<'a, Vec<TradeEvent>>;
}

/// Real-time trade source.
pub trait TradeFeed: Send + Sync {
    /// Connects, authenticates and subscribes to `pattern`.
    ///
    /// The returned stream yields one batch per provider frame and ends when
    /// the connection closes.
    fn subscribe<'a>(&'a self, pattern: &'a str) -> ProviderFuture<'a, TradeBatchStream<'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_retryability_follow_kind() {
        let error = ProviderError::not_found("ticker ZVZZT missing");
        assert!(error.is_not_found());
        assert!(!error.retryable());
        assert_eq!(error.code(), "provider.not_found");

        let error = ProviderError::rate_limited("slow down");
        assert!(error.retryable());
        assert_eq!(error.kind(), ProviderErrorKind::RateLimited);
    }

    #[test]
    fn display_includes_code() {
        let error = ProviderError::unauthorized("auth_failed");
        assert_eq!(error.to_string(), "auth_failed (provider.unauthorized)");
    }
}
