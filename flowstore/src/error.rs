use thiserror::Error;

/// Errors raised by key store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(#[from] duckdb::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("invalid option {key}: {reason}")]
    InvalidOption { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
