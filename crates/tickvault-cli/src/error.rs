use thiserror::Error;
use tickvault_core::{BackfillError, ConfigError, LiveError, RuleError, ValidationError};

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rules(#[from] RuleError),

    #[error(transparent)]
    Backfill(#[from] BackfillError),

    #[error(transparent)]
    Live(#[from] LiveError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 3,
            Self::Rules(RuleError::Io { .. }) => 10,
            Self::Rules(_) => 2,
            Self::Backfill(error) => match error {
                BackfillError::Validation(_) => 2,
                BackfillError::CreateOutdir { .. } | BackfillError::Archive { .. } => 10,
                BackfillError::ListTickers { .. }
                | BackfillError::TickerDetail { .. }
                | BackfillError::TickerTrades { .. }
                | BackfillError::Task { .. } => 4,
            },
            Self::Live(LiveError::Feed(_)) => 4,
            Self::Live(_) | Self::Io(_) => 10,
        }
    }
}
