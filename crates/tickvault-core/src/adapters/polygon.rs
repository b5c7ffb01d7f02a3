use std::sync::Arc;

use serde::Deserialize;
use time::Date;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::domain::{format_date, TickerRecord, TickerSummary, TradeEvent};
use crate::http_client::{HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
use crate::provider::{ProviderError, ProviderFuture, ReferenceDataProvider};
use crate::retry::RetryConfig;
use crate::throttling::RequestThrottle;

/// Polygon reference-data and trade-history REST adapter.
///
/// Every request waits on the shared throttle, carries bearer auth and is
/// retried on transient failures according to [`RetryConfig`].
#[derive(Clone)]
pub struct PolygonAdapter {
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    base_url: String,
    timeout_ms: u64,
    retry: RetryConfig,
    throttle: RequestThrottle,
}

impl PolygonAdapter {
    pub fn new(config: &ProviderConfig) -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()), config)
    }

    pub fn with_http_client(http_client: Arc<dyn HttpClient>, config: &ProviderConfig) -> Self {
        Self {
            http_client,
            auth: HttpAuth::BearerToken(config.api_key.clone()),
            base_url: config.rest_url.trim_end_matches('/').to_owned(),
            timeout_ms: config.timeout_ms,
            retry: RetryConfig::exponential(config.max_retries),
            throttle: RequestThrottle::per_second(config.rate_limit),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_throttle(mut self, throttle: RequestThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, url: &str) -> Result<HttpResponse, ProviderError> {
        let mut attempt = 0_u32;
        loop {
            self.throttle.until_ready().await;

            let request = HttpRequest::get(url)
                .with_auth(&self.auth)
                .with_timeout_ms(self.timeout_ms);

            let failure = match self.http_client.execute(request).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => {
                    if !self.retry.should_retry_status(response.status) {
                        return Err(status_error(url, &response));
                    }
                    Failure::Status(response)
                }
                Err(error) => {
                    if !self.retry.should_retry_error(&error) {
                        return Err(transport_error(url, &error));
                    }
                    Failure::Transport(error)
                }
            };

            if attempt >= self.retry.max_retries {
                return Err(failure.into_provider_error(url));
            }

            let delay = self.retry.delay_for_attempt(attempt);
            attempt += 1;
            warn!(
                url,
                attempt,
                max_retries = self.retry.max_retries,
                delay_ms = delay.as_millis() as u64,
                reason = %failure,
                "retrying polygon request"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn get_json<T>(&self, url: &str) -> Result<T, ProviderError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self.get(url).await?;
        serde_json::from_str(&response.body).map_err(|error| {
            ProviderError::invalid_response(format!("polygon response from {url} did not parse: {error}"))
        })
    }

    /// Collects `results` across every page reachable through `next_url`.
    async fn get_pages<T>(&self, first_url: String) -> Result<(Vec<T>, usize), ProviderError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut next_url = Some(first_url);
        let mut items = Vec::new();
        let mut pages = 0_usize;

        while let Some(url) = next_url.take() {
            let page: Page<T> = self.get_json(&url).await?;
            pages += 1;
            items.extend(page.results);
            next_url = page.next_url.filter(|next| !next.is_empty() && *next != url);
        }
        Ok((items, pages))
    }
}

impl ReferenceDataProvider for PolygonAdapter {
    fn list_tickers<'a>(
        &'a self,
        as_of: Date,
        market: &'a str,
        page_limit: u32,
    ) -> ProviderFuture<'a, Vec<TickerSummary>> {
        Box::pin(async move {
            let url = format!(
                "{}/v3/reference/tickers?date={}&market={}&limit={page_limit}",
                self.base_url,
                format_date(as_of),
                urlencoding::encode(market),
            );
            let (tickers, pages) = self.get_pages::<TickerSummary>(url).await?;

            debug!(date = %format_date(as_of), market, pages, tickers = tickers.len(), "listed tickers");
            Ok(tickers)
        })
    }

    fn ticker_details<'a>(
        &'a self,
        ticker: &'a str,
        as_of: Date,
    ) -> ProviderFuture<'a, TickerRecord> {
        Box::pin(async move {
            let url = format!(
                "{}/v3/reference/tickers/{}?date={}",
                self.base_url,
                urlencoding::encode(ticker),
                format_date(as_of),
            );
            let payload: TickerDetailsResponse = self.get_json(&url).await?;
            payload.results.ok_or_else(|| {
                ProviderError::not_found(format!(
                    "polygon returned no details for {ticker} on {}",
                    format_date(as_of)
                ))
            })
        })
    }

    fn list_trades<'a>(&'a self, ticker: &'a str, date: Date) -> ProviderFuture<'a, Vec<TradeEvent>> {
        Box::pin(async move {
            let day = format_date(date);
            let url = format!(
                "{}/v3/trades/{}?timestamp={day}&limit={TRADE_PAGE_LIMIT}",
                self.base_url,
                urlencoding::encode(ticker),
            );
            let (trades, pages) = self.get_pages::<RestTrade>(url).await?;
            if trades.is_empty() {
                return Err(ProviderError::not_found(format!(
                    "polygon returned no trades for {ticker} on {day}"
                )));
            }

            debug!(date = %day, ticker, pages, trades = trades.len(), "listed trades");
            Ok(trades
                .into_iter()
                .map(|trade| trade.into_event(ticker))
                .collect())
        })
    }
}

const TRADE_PAGE_LIMIT: u32 = 50_000;

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    next_url: Option<String>,
}

/// Historical trade as the REST API names its fields.
#[derive(Debug, Deserialize)]
struct RestTrade {
    #[serde(default)]
    conditions: Vec<i32>,
    correction: Option<i64>,
    exchange: Option<i64>,
    id: Option<String>,
    participant_timestamp: Option<i64>,
    price: Option<f64>,
    sequence_number: Option<i64>,
    sip_timestamp: Option<i64>,
    size: Option<i64>,
    tape: Option<i64>,
    trf_id: Option<i64>,
    trf_timestamp: Option<i64>,
}

impl RestTrade {
    fn into_event(self, ticker: &str) -> TradeEvent {
        TradeEvent {
            symbol: ticker.to_owned(),
            conditions: self.conditions,
            correction: self.correction,
            exchange: self.exchange,
            id: self.id,
            participant_timestamp: self.participant_timestamp,
            price: self.price,
            sequence_number: self.sequence_number,
            timestamp: self.sip_timestamp,
            size: self.size,
            tape: self.tape,
            trf_id: self.trf_id,
            trf_timestamp: self.trf_timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    results: Option<TickerRecord>,
}

enum Failure {
    Status(HttpResponse),
    Transport(HttpError),
}

impl Failure {
    fn into_provider_error(self, url: &str) -> ProviderError {
        match self {
            Self::Status(response) => status_error(url, &response),
            Self::Transport(error) => transport_error(url, &error),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(response) => write!(f, "status {}", response.status),
            Self::Transport(error) => f.write_str(error.message()),
        }
    }
}

fn status_error(url: &str, response: &HttpResponse) -> ProviderError {
    let message = format!("polygon returned status {} for {url}", response.status);
    match response.status {
        404 => ProviderError::not_found(message),
        401 | 403 => ProviderError::unauthorized(message),
        429 => ProviderError::rate_limited(message),
        408 | 500..=599 => ProviderError::unavailable(message),
        _ => ProviderError::internal(message),
    }
}

fn transport_error(url: &str, error: &HttpError) -> ProviderError {
    let message = format!("polygon transport error for {url}: {}", error.message());
    if error.retryable() {
        ProviderError::unavailable(message)
    } else {
        ProviderError::internal(message)
    }
}
