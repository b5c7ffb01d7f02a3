use std::sync::Arc;

use tickvault_core::{run_live, LiveFilter, PolygonStream, RuleSet};
use tracing::info;

use crate::cli::{Cli, LiveArgs};
use crate::error::CliError;

use super::provider_config;

pub async fn run(cli: &Cli, args: &LiveArgs) -> Result<(), CliError> {
    let rules = Arc::new(RuleSet::load(&args.rules)?);
    info!(rules = rules.len(), path = %args.rules.display(), "loaded test-issue rules");

    let feed = PolygonStream::new(&provider_config(cli)?);
    let mut filter = LiveFilter::new(rules, std::io::stdout().lock());
    if args.header {
        filter.write_header()?;
    }
    let outcome = run_live(&feed, &mut filter, &args.subscribe).await?;

    info!(
        emitted = outcome.emitted,
        dropped = outcome.dropped,
        "live session finished"
    );
    Ok(())
}
