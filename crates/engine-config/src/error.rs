use engine_processing::error::CalculatorError;
use thiserror::Error;

/// Errors raised while validating job settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A numeric setting is outside its allowed range.
    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue { name: &'static str, reason: String },

    /// The consistency check algorithm or its properties were rejected.
    #[error("Invalid consistency check algorithm: {0}")]
    Algorithm(#[from] CalculatorError),

    /// The raw settings document could not be parsed.
    #[error("Malformed settings: {0}")]
    Malformed(#[from] serde_json::Error),
}
