use thiserror::Error;

/// Validation errors for user-supplied values exposed by `tickvault-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("date must be formatted as YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },

    #[error("date range start {from} is after end {to}")]
    InvertedRange { from: String, to: String },

    #[error("field '{field}' must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("field '{field}' must be at most {max}")]
    TooLarge { field: &'static str, max: usize },

    #[error("market cannot be empty")]
    EmptyMarket,
}

/// Configuration errors raised while assembling provider settings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no API key provided; set POLYGON_API_KEY or POLYGON_KEY")]
    MissingApiKey,

    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}
