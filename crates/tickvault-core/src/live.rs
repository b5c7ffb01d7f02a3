//! Live trade filter: drops test issues and prints the rest as CSV.

use std::io::Write;
use std::ops::AddAssign;
use std::sync::Arc;

use futures_util::StreamExt;
use thiserror::Error;
use time::Date;
use tracing::{debug, info};

use crate::domain::{today_utc, TradeEvent, TRADE_COLUMNS};
use crate::provider::{ProviderError, TradeFeed};
use crate::rules::RuleSet;

#[derive(Debug, Error)]
pub enum LiveError {
    #[error("failed to write trade row: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to flush trade output: {0}")]
    Io(#[from] std::io::Error),

    #[error("trade feed failed: {0}")]
    Feed(#[from] ProviderError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub emitted: usize,
    pub dropped: usize,
}

impl AddAssign for BatchOutcome {
    fn add_assign(&mut self, other: Self) {
        self.emitted += other.emitted;
        self.dropped += other.dropped;
    }
}

/// Classifies trade batches against a rule set and writes surviving trades.
///
/// Output is data rows only unless [`LiveFilter::write_header`] is called, so
/// restarted sessions can append to the same sink. The sink is flushed after
/// every row so downstream readers see trades as they arrive.
pub struct LiveFilter<W: Write> {
    rules: Arc<RuleSet>,
    writer: csv::Writer<W>,
}

impl<W: Write> LiveFilter<W> {
    pub fn new(rules: Arc<RuleSet>, sink: W) -> Self {
        Self {
            rules,
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_header(&mut self) -> Result<(), LiveError> {
        self.writer.write_record(TRADE_COLUMNS)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn on_event_batch(
        &mut self,
        events: &[TradeEvent],
        today: Date,
    ) -> Result<BatchOutcome, LiveError> {
        let mut outcome = BatchOutcome::default();
        for event in events {
            if self.rules.is_excluded(&event.symbol, today) {
                outcome.dropped += 1;
                continue;
            }
            self.writer.write_record(event.to_row())?;
            self.writer.flush()?;
            outcome.emitted += 1;
        }
        Ok(outcome)
    }

    pub fn into_inner(self) -> Result<W, LiveError> {
        self.writer
            .into_inner()
            .map_err(|error| LiveError::Io(error.into_error()))
    }
}

/// Subscribes to `pattern` and runs every batch through `filter` until the
/// feed ends.
pub async fn run_live<W: Write>(
    feed: &dyn TradeFeed,
    filter: &mut LiveFilter<W>,
    pattern: &str,
) -> Result<BatchOutcome, LiveError> {
    let mut batches = feed.subscribe(pattern).await?;
    let mut totals = BatchOutcome::default();
    while let Some(batch) = batches.next().await {
        let outcome = filter.on_event_batch(&batch?, today_utc())?;
        debug!(emitted = outcome.emitted, dropped = outcome.dropped, "trade batch");
        totals += outcome;
    }

    info!(emitted = totals.emitted, dropped = totals.dropped, "trade feed ended");
    Ok(totals)
}
