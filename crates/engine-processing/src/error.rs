use connectors::error::AdapterError;
use model::{pagination::position::PositionError, scan::request::RequestError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink channel closed")]
    Closed,

    #[error("Sink error: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to read range '{range_key}' of table '{table}': {source}")]
    Read {
        table: String,
        range_key: String,
        #[source]
        source: AdapterError,
    },

    #[error("Retry attempts exhausted reading range '{range_key}' of table '{table}': {source}")]
    RetriesExhausted {
        table: String,
        range_key: String,
        #[source]
        source: AdapterError,
    },

    #[error("Cannot advance range '{range_key}': {source}")]
    Position {
        range_key: String,
        #[source]
        source: PositionError,
    },

    #[error("Row of range '{0}' has no unique key value")]
    MissingKey(String),

    #[error("Failed to deliver batch '{batch_id}': {source}")]
    Sink {
        batch_id: String,
        #[source]
        source: SinkError,
    },

    #[error("Invalid scan request: {0}")]
    Request(#[from] RequestError),

    #[error("Worker for range '{0}' has already run")]
    AlreadyStarted(String),

    #[error("The progress channel was closed unexpectedly.")]
    ProgressClosed,
}

#[derive(Error, Debug)]
pub enum CalculatorError {
    #[error("Invalid value for algorithm property '{key}': {reason}")]
    InvalidParameter { key: String, reason: String },

    #[error("Unsupported consistency check algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Table '{0}' has no unique key to order rows by")]
    NoUniqueKey(String),

    #[error("Failed to load rows of table '{table}': {source}")]
    LoadingFailed {
        table: String,
        #[source]
        source: AdapterError,
    },

    #[error("Invalid scan request: {0}")]
    Request(#[from] RequestError),
}

impl CalculatorError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CalculatorError::UnsupportedAlgorithm(_))
    }
}
