use crate::sql::base::error::{ConnectorError, DbError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// An unsupported source kind was requested.
    #[error("Unsupported source kind: {0}")]
    UnsupportedKind(String),

    /// Failed to open a connection or pool.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Database-related error.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// The source cannot perform the requested operation, e.g. a CRC32
    /// aggregate on a database without one.
    #[error("Operation not supported by {source_name}: {operation}")]
    Unsupported {
        source_name: String,
        operation: String,
    },

    /// Generic adapter error.
    #[error("Adapter error: {0}")]
    Generic(String),
}
