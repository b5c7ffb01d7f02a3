mod backfill;
mod live;

use tickvault_core::{load_dotenv, ProviderConfig};

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Backfill(args) => backfill::run(cli, args).await,
        Command::Live(args) => live::run(cli, args).await,
    }
}

/// Provider settings from the environment, with global flags applied.
fn provider_config(cli: &Cli) -> Result<ProviderConfig, CliError> {
    load_dotenv();
    let config = ProviderConfig::from_env()?
        .with_timeout_ms(cli.timeout_ms)
        .with_max_retries(cli.max_retries)
        .with_rate_limit(cli.rate_limit);
    tracing::debug!(?config, "provider configuration loaded");
    Ok(config)
}
