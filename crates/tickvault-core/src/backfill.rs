//! Historical reference-data and trade backfill.
//!
//! Two bounded pools run on the tokio runtime:
//!
//! - days: one task per weekday of the range, at most `day_concurrency` active,
//!   reported in completion order;
//! - tickers: per day, one task per ticker, at most `ticker_concurrency` active,
//!   consumed in submission (sorted) order so every archive is deterministic.
//!
//! A day yields a reference archive and, when a trades directory is configured,
//! a trade archive covering the tickers that made it into the reference one.
//! Each archive is skipped on its own when it already exists.
//!
//! The first fatal error stops the run. Tickers the provider reports as not
//! found are skipped with a warning.

use std::collections::{HashMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use time::Date;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::archive::{archive_path, archived_tickers, ArchiveError, ArchiveWriter};
use crate::config::BackfillConfig;
use crate::domain::{format_date, DateRange, TickerSummary, TICKER_COLUMNS, TRADE_COLUMNS};
use crate::error::ValidationError;
use crate::provider::{ProviderError, ReferenceDataProvider};
use crate::rules::RuleSet;

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to create output directory {path}: {source}")]
    CreateOutdir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to list tickers for {date}: {source}")]
    ListTickers {
        date: String,
        #[source]
        source: ProviderError,
    },

    #[error("failed to fetch details for {ticker} on {date}: {source}")]
    TickerDetail {
        ticker: String,
        date: String,
        #[source]
        source: ProviderError,
    },

    #[error("failed to fetch trades for {ticker} on {date}: {source}")]
    TickerTrades {
        ticker: String,
        date: String,
        #[source]
        source: ProviderError,
    },

    #[error("failed to write archive for {date}: {source}")]
    Archive {
        date: String,
        #[source]
        source: ArchiveError,
    },

    #[error("{task} task for {date} did not complete: {message}")]
    Task {
        task: &'static str,
        date: String,
        message: String,
    },
}

impl BackfillError {
    /// The provider error behind this failure, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::ListTickers { source, .. }
            | Self::TickerDetail { source, .. }
            | Self::TickerTrades { source, .. } => Some(source),
            _ => None,
        }
    }

    fn archive(date: Date, source: ArchiveError) -> Self {
        Self::Archive {
            date: format_date(date),
            source,
        }
    }

    fn task(task: &'static str, date: Date, message: impl Into<String>) -> Self {
        Self::Task {
            task,
            date: format_date(date),
            message: message.into(),
        }
    }
}

/// What happened to one archive of a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayStatus {
    Written { rows: usize },
    /// The archive already existed and `force` was off.
    Skipped,
}

impl DayStatus {
    const fn rows(self) -> usize {
        match self {
            Self::Written { rows } => rows,
            Self::Skipped => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayResult {
    pub date: Date,
    /// Reference archive.
    pub status: DayStatus,
    /// Trade archive, `None` when trades are not being archived.
    pub trades: Option<DayStatus>,
}

impl DayResult {
    /// True when every archive of the day already existed.
    pub fn is_skipped(&self) -> bool {
        self.status == DayStatus::Skipped
            && self.trades.map_or(true, |trades| trades == DayStatus::Skipped)
    }
}

impl Display for DayResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_skipped() {
            write!(f, "{} (skipped)", format_date(self.date))
        } else {
            f.write_str(&format_date(self.date))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    /// Days with at least one archive written.
    pub written: usize,
    pub skipped: usize,
    /// Reference rows written.
    pub rows: usize,
    /// Trade rows written.
    pub trades: usize,
}

impl BackfillSummary {
    fn record(&mut self, day: &DayResult) {
        if day.is_skipped() {
            self.skipped += 1;
        } else {
            self.written += 1;
        }
        self.rows += day.status.rows();
        self.trades += day.trades.map_or(0, DayStatus::rows);
    }
}

type TickerTask<T> = (String, JoinHandle<Result<T, ProviderError>>);

/// Per-ticker fetches of one day, awaited in submission order.
///
/// Dropping the queue aborts every task not yet awaited.
struct OrderedTasks<T> {
    tasks: VecDeque<TickerTask<T>>,
}

impl<T> OrderedTasks<T> {
    fn next(&mut self) -> Option<TickerTask<T>> {
        self.tasks.pop_front()
    }
}

impl<T> Drop for OrderedTasks<T> {
    fn drop(&mut self) {
        for (_, handle) in &self.tasks {
            handle.abort();
        }
    }
}

/// Produces the archives of a single day.
#[derive(Clone)]
pub struct DayFetcher {
    provider: Arc<dyn ReferenceDataProvider>,
    test_issues: Option<Arc<RuleSet>>,
    config: Arc<BackfillConfig>,
}

impl DayFetcher {
    pub fn new(provider: Arc<dyn ReferenceDataProvider>, config: BackfillConfig) -> Self {
        Self {
            provider,
            test_issues: None,
            config: Arc::new(config),
        }
    }

    /// Drops tickers these rules classify as test issues before fetching details.
    pub fn with_test_issues(mut self, rules: Arc<RuleSet>) -> Self {
        self.test_issues = Some(rules);
        self
    }

    pub fn config(&self) -> &BackfillConfig {
        &self.config
    }

    /// Archives one day.
    ///
    /// # Errors
    ///
    /// Fails with [`BackfillError::Validation`] before any request when the
    /// configuration is unusable, otherwise with the first fatal fetch or
    /// archive error of the day.
    pub async fn fetch_day(&self, date: Date) -> Result<DayResult, BackfillError> {
        self.config.validate()?;
        let day = format_date(date);

        let tickers_path = archive_path(&self.config.outdir, date);
        let tickers_done = self.already_archived(&tickers_path, date).await?;
        let trades_done = match &self.config.trades_outdir {
            Some(dir) => Some(self.already_archived(&archive_path(dir, date), date).await?),
            None => None,
        };

        if tickers_done && trades_done != Some(false) {
            debug!(date = %day, "archives exist, skipping");
            return Ok(DayResult {
                date,
                status: DayStatus::Skipped,
                trades: trades_done.map(|_| DayStatus::Skipped),
            });
        }

        let (status, survivors) = if tickers_done {
            debug!(date = %day, "reference archive exists, reading its tickers");
            let archived = archived_tickers(&tickers_path)
                .await
                .map_err(|source| BackfillError::archive(date, source))?;
            let survivors = archived
                .into_iter()
                .filter(|ticker| self.keeps(ticker, date))
                .collect::<Vec<_>>();
            (DayStatus::Skipped, survivors)
        } else {
            let (rows, survivors) = self.archive_details(date).await?;
            (DayStatus::Written { rows }, survivors)
        };

        let trades = match (&self.config.trades_outdir, trades_done) {
            (Some(dir), Some(false)) => Some(DayStatus::Written {
                rows: self.archive_trades(dir, survivors, date).await?,
            }),
            (_, done) => done.map(|_| DayStatus::Skipped),
        };

        Ok(DayResult {
            date,
            status,
            trades,
        })
    }

    /// Whether `path` exists and may be left alone.
    async fn already_archived(&self, path: &Path, date: Date) -> Result<bool, BackfillError> {
        if self.config.force {
            return Ok(false);
        }
        tokio::fs::try_exists(path).await.map_err(|source| {
            BackfillError::archive(
                date,
                ArchiveError::Io {
                    action: "stat",
                    path: path.display().to_string(),
                    source,
                },
            )
        })
    }

    /// Writes the reference archive and returns its row count and tickers.
    async fn archive_details(&self, date: Date) -> Result<(usize, Vec<String>), BackfillError> {
        let day = format_date(date);
        let listed = self
            .provider
            .list_tickers(date, &self.config.market, self.config.page_limit)
            .await
            .map_err(|source| BackfillError::ListTickers {
                date: day.clone(),
                source,
            })?;
        let tickers = self.universe(listed, date);
        debug!(date = %day, tickers = tickers.len(), "fetching ticker details");

        let mut tasks = self.spawn_ordered(tickers, move |provider, ticker| async move {
            provider.ticker_details(&ticker, date).await
        });
        let mut archive = ArchiveWriter::create(&self.config.outdir, date, &TICKER_COLUMNS)
            .await
            .map_err(|source| BackfillError::archive(date, source))?;

        let mut survivors = Vec::new();
        while let Some((ticker, handle)) = tasks.next() {
            let outcome = handle
                .await
                .map_err(|error| BackfillError::task("ticker", date, error.to_string()))?;
            match outcome {
                Ok(record) => {
                    archive
                        .write_record(&record)
                        .await
                        .map_err(|source| BackfillError::archive(date, source))?;
                    survivors.push(ticker);
                }
                Err(error) if error.is_not_found() => {
                    warn!(ticker = %ticker, date = %day, "no details for ticker, skipping");
                }
                Err(source) => {
                    return Err(BackfillError::TickerDetail {
                        ticker,
                        date: day,
                        source,
                    })
                }
            }
        }

        let rows = archive.rows();
        archive
            .commit()
            .await
            .map_err(|source| BackfillError::archive(date, source))?;
        info!(date = %day, rows, "day archived");
        Ok((rows, survivors))
    }

    /// Writes the trade archive of `tickers`, each ticker's prints in time order.
    async fn archive_trades(
        &self,
        outdir: &Path,
        tickers: Vec<String>,
        date: Date,
    ) -> Result<usize, BackfillError> {
        let day = format_date(date);
        debug!(date = %day, tickers = tickers.len(), "fetching trades");

        let mut tasks = self.spawn_ordered(tickers, move |provider, ticker| async move {
            provider.list_trades(&ticker, date).await
        });
        let mut archive = ArchiveWriter::create(outdir, date, &TRADE_COLUMNS)
            .await
            .map_err(|source| BackfillError::archive(date, source))?;

        while let Some((ticker, handle)) = tasks.next() {
            let outcome = handle
                .await
                .map_err(|error| BackfillError::task("trades", date, error.to_string()))?;
            match outcome {
                Ok(mut trades) => {
                    trades.sort_by_key(|trade| trade.timestamp);
                    for trade in &trades {
                        archive
                            .write_row(&trade.to_row())
                            .await
                            .map_err(|source| BackfillError::archive(date, source))?;
                    }
                }
                Err(error) if error.is_not_found() => {
                    warn!(ticker = %ticker, date = %day, "no trades for ticker, skipping");
                }
                Err(source) => {
                    return Err(BackfillError::TickerTrades {
                        ticker,
                        date: day,
                        source,
                    })
                }
            }
        }

        let rows = archive.rows();
        archive
            .commit()
            .await
            .map_err(|source| BackfillError::archive(date, source))?;
        info!(date = %day, rows, "trades archived");
        Ok(rows)
    }

    fn keeps(&self, ticker: &str, date: Date) -> bool {
        match &self.test_issues {
            Some(rules) => !rules.is_excluded(ticker, date),
            None => true,
        }
    }

    /// Applies the test-issue filter, then sorts and de-duplicates.
    fn universe(&self, listed: Vec<TickerSummary>, date: Date) -> Vec<String> {
        let mut tickers = listed
            .into_iter()
            .map(|summary| summary.ticker)
            .filter(|ticker| self.keeps(ticker, date))
            .collect::<Vec<_>>();
        tickers.sort_unstable();
        tickers.dedup();
        tickers
    }

    /// Spawns `fetch` per ticker behind a `ticker_concurrency` wide semaphore.
    fn spawn_ordered<T, F, Fut>(&self, tickers: Vec<String>, fetch: F) -> OrderedTasks<T>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn ReferenceDataProvider>, String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.config.ticker_concurrency));
        let tasks = tickers
            .into_iter()
            .map(|ticker| {
                let permits = Arc::clone(&permits);
                let request = fetch(Arc::clone(&self.provider), ticker.clone());
                let handle = tokio::spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|_| ProviderError::internal("ticker pool closed"))?;
                    request.await
                });
                (ticker, handle)
            })
            .collect();
        OrderedTasks { tasks }
    }
}

/// Walks a [`DateRange`] with bounded day-level concurrency.
#[derive(Clone)]
pub struct Backfill {
    fetcher: DayFetcher,
}

impl Backfill {
    pub fn new(fetcher: DayFetcher) -> Self {
        Self { fetcher }
    }

    /// Archives every weekday of `range`, calling `on_day` as each day resolves.
    ///
    /// # Errors
    ///
    /// Returns the first fatal day error. In-flight days are aborted and their
    /// partial files removed before this returns.
    pub async fn run<F>(&self, range: DateRange, mut on_day: F) -> Result<BackfillSummary, BackfillError>
    where
        F: FnMut(&DayResult),
    {
        let config = self.fetcher.config();
        config.validate()?;
        for outdir in std::iter::once(&config.outdir).chain(config.trades_outdir.as_ref()) {
            tokio::fs::create_dir_all(outdir)
                .await
                .map_err(|source| BackfillError::CreateOutdir {
                    path: outdir.display().to_string(),
                    source,
                })?;
        }

        info!(
            range = %range,
            day_concurrency = config.day_concurrency,
            ticker_concurrency = config.ticker_concurrency,
            outdir = %config.outdir.display(),
            trades = config.trades_outdir.is_some(),
            "starting backfill"
        );

        let permits = Arc::new(Semaphore::new(config.day_concurrency));
        let mut days = JoinSet::new();
        let mut dates = HashMap::new();
        for date in range.weekdays() {
            let fetcher = self.fetcher.clone();
            let permits = Arc::clone(&permits);
            let handle = days.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| BackfillError::task("day", date, "day pool closed"))?;
                fetcher.fetch_day(date).await
            });
            dates.insert(handle.id(), date);
        }

        let mut summary = BackfillSummary::default();
        while let Some(joined) = days.join_next_with_id().await {
            let outcome = match joined {
                Ok((_, outcome)) => outcome,
                Err(error) => Err(BackfillError::Task {
                    task: "day",
                    date: dates
                        .get(&error.id())
                        .map_or_else(|| String::from("unknown"), |date| format_date(*date)),
                    message: error.to_string(),
                }),
            };
            match outcome {
                Ok(day) => {
                    summary.record(&day);
                    on_day(&day);
                }
                Err(error) => {
                    days.shutdown().await;
                    return Err(error);
                }
            }
        }

        info!(
            written = summary.written,
            skipped = summary.skipped,
            rows = summary.rows,
            trades = summary.trades,
            "backfill complete"
        );
        Ok(summary)
    }
}
