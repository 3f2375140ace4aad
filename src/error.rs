use thiserror::Error;

/// Failure to hand a window result to its sink.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection refused by {0}")]
    ConnectionRefused(String),

    #[error("endpoint not found (404): {0}")]
    InvalidEndpoint(String),

    #[error("request rejected as malformed (400): {0}")]
    BadRequest(String),

    #[error("unexpected response status {0}")]
    UnexpectedStatus(u16),

    #[error("delivery timed out")]
    Timeout,

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure inside a counting backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("store error: {0}")]
    Store(#[from] flowstore_core::StoreError),
}

/// Top-level errors surfaced by the service.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] flowstore_core::StoreError),

    #[error("sink setup failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("telemetry error: {0}")]
    Telemetry(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("invalid setting {key}: {reason}")]
    Setting { key: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, FlowError>;
