use std::io::Write;
use std::sync::Arc;

use tickvault_core::{
    format_date, parse_date, today_utc, Backfill, BackfillConfig, DateRange, DayFetcher, EndBound,
    PolygonAdapter, RuleSet,
};
use tracing::info;

use crate::cli::{BackfillArgs, Cli};
use crate::error::CliError;

use super::provider_config;

pub async fn run(cli: &Cli, args: &BackfillArgs) -> Result<(), CliError> {
    let range = date_range(args)?;
    let config = BackfillConfig {
        outdir: args.outdir.clone(),
        trades_outdir: args.trades.then(|| args.trades_outdir.clone()),
        force: args.force,
        day_concurrency: args.day_concurrency,
        ticker_concurrency: args.ticker_concurrency,
        market: args.market.clone(),
        page_limit: args.page_limit,
    };
    config.validate()?;

    let test_issues = args
        .test_issues
        .as_ref()
        .map(RuleSet::load)
        .transpose()?
        .map(Arc::new);

    let provider = Arc::new(PolygonAdapter::new(&provider_config(cli)?));
    let mut fetcher = DayFetcher::new(provider, config);
    if let Some(rules) = test_issues {
        info!(rules = rules.len(), "filtering test issues from backfill");
        fetcher = fetcher.with_test_issues(rules);
    }

    let stdout = std::io::stdout();
    let mut write_error = None;
    let summary = Backfill::new(fetcher)
        .run(range, |day| {
            let mut out = stdout.lock();
            if let Err(error) = writeln!(out, "{day}").and_then(|()| out.flush()) {
                write_error.get_or_insert(error);
            }
        })
        .await?;

    if let Some(error) = write_error {
        return Err(error.into());
    }

    info!(
        from = %format_date(range.from()),
        to = %format_date(range.to()),
        written = summary.written,
        skipped = summary.skipped,
        rows = summary.rows,
        trades = summary.trades,
        "backfill finished"
    );
    Ok(())
}

fn date_range(args: &BackfillArgs) -> Result<DateRange, CliError> {
    let from = parse_date(&args.from)?;
    let to = match &args.to {
        Some(value) => parse_date(value)?,
        None => today_utc(),
    };
    let end = if args.include_end {
        EndBound::Inclusive
    } else {
        EndBound::Exclusive
    };
    Ok(DateRange::with_end(from, to, end)?)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Command;

    fn args(argv: &[&str]) -> BackfillArgs {
        let cli = Cli::try_parse_from(argv).expect("args parse");
        match cli.command {
            Command::Backfill(args) => args,
            Command::Live(_) => panic!("expected backfill"),
        }
    }

    #[test]
    fn include_end_switches_bound() {
        let range = date_range(&args(&[
            "tickvault",
            "backfill",
            "--from",
            "2021-01-01",
            "--to",
            "2021-01-11",
            "--include-end",
        ]))
        .expect("valid range");

        assert_eq!(range.end_bound(), EndBound::Inclusive);
        assert_eq!(range.weekdays().count(), 7);
    }

    #[test]
    fn inverted_range_is_a_validation_error() {
        let error = date_range(&args(&[
            "tickvault",
            "backfill",
            "--from",
            "2021-02-01",
            "--to",
            "2021-01-01",
        ]))
        .expect_err("must fail");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn trades_flag_enables_the_trade_directory() {
        let parsed = args(&["tickvault", "backfill", "--trades", "--trades-outdir", "prints"]);
        assert!(parsed.trades);
        assert_eq!(parsed.trades_outdir, std::path::PathBuf::from("prints"));

        let defaults = args(&["tickvault", "backfill"]);
        assert!(!defaults.trades);
        assert_eq!(defaults.trades_outdir, std::path::PathBuf::from("trades"));
    }
}
