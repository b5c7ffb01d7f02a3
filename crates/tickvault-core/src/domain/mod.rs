//! # Domain Models
//!
//! | Type | Description |
//! |------|-------------|
//! | [`DateRange`] | Business-day span walked by the backfill |
//! | [`TickerSummary`] | One entry of a day's ticker universe |
//! | [`TickerRecord`] | Reference data row for one ticker and day |
//! | [`TradeEvent`] | Trade print, streamed live or listed for a past day |

mod calendar;
mod ticker;
mod trade;

pub use calendar::{
    format_date, is_weekday, parse_date, today_utc, DateRange, EndBound, Weekdays,
};
pub use ticker::{Address, Branding, TickerRecord, TickerSummary, TICKER_COLUMNS};
pub use trade::{TradeEvent, TRADE_COLUMNS};
