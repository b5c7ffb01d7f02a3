//! CLI argument definitions for tickvault.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `backfill` | Archive daily ticker reference data as `{date}.csv.gz` |
//! | `live` | Stream trades, dropping test issues, as CSV on stdout |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--timeout-ms` | `10000` | Per-request timeout in ms |
//! | `--max-retries` | `20` | Retries per request on transient failures |
//! | `--rate-limit` | `100` | Requests per second, `0` for unlimited |
//!
//! # Examples
//!
//! ```bash
//! # Archive January 2021
//! tickvault backfill --from 2021-01-01 --to 2021-02-01 -o tickers
//!
//! # Stream all trades except test issues
//! tickvault live --rules test_issues.txt > trades.csv
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// tickvault - daily ticker reference archives and live trade filtering
#[derive(Debug, Parser)]
#[command(name = "tickvault", author, version, about = "Daily ticker reference archives and live trade filtering")]
pub struct Cli {
    /// Per-request timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// Retries per request on transient failures.
    #[arg(long, global = true, default_value_t = 20)]
    pub max_retries: u32,

    /// Provider requests per second across all workers (0 = unlimited).
    #[arg(long, global = true, default_value_t = 100)]
    pub rate_limit: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download ticker reference data for every weekday in a range.
    Backfill(BackfillArgs),
    /// Print real-time trades that are not test issues.
    Live(LiveArgs),
}

#[derive(Debug, Clone, Args)]
pub struct BackfillArgs {
    /// First day (YYYY-MM-DD).
    #[arg(long, default_value = "2003-09-10")]
    pub from: String,

    /// Day after the last one archived (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long)]
    pub to: Option<String>,

    /// Archive `--to` as well.
    #[arg(long, default_value_t = false)]
    pub include_end: bool,

    /// Output directory.
    #[arg(short = 'o', long, default_value = "tickers")]
    pub outdir: PathBuf,

    /// Re-download days whose archive already exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// Also archive each day's trades for the tickers kept in the reference archive.
    #[arg(long, default_value_t = false)]
    pub trades: bool,

    /// Output directory of trade archives.
    #[arg(long, default_value = "trades")]
    pub trades_outdir: PathBuf,

    /// Rule file of test issues to leave out of the archives.
    #[arg(long)]
    pub test_issues: Option<PathBuf>,

    /// Days fetched concurrently.
    #[arg(long, default_value_t = 5)]
    pub day_concurrency: usize,

    /// Ticker detail requests in flight per day.
    #[arg(long, default_value_t = 50)]
    pub ticker_concurrency: usize,

    /// Market to list tickers for.
    #[arg(long, default_value = "stocks")]
    pub market: String,

    /// Page size of the ticker listing.
    #[arg(long, default_value_t = 1000)]
    pub page_limit: u32,
}

#[derive(Debug, Clone, Args)]
pub struct LiveArgs {
    /// Rule file of test issues to drop.
    #[arg(long)]
    pub rules: PathBuf,

    /// Subscription pattern.
    #[arg(long, default_value = "T.*")]
    pub subscribe: String,

    /// Print the column header before the first trade.
    #[arg(long, default_value_t = false)]
    pub header: bool,
}
