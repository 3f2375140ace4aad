//! Window result delivery.
//!
//! A [`ResultSink`] hands one [`WindowResult`] to a downstream system. Sinks
//! report failure but never retry; the scheduler logs the error and moves on
//! to the next window.
//!
//! - [`TopicSink`]: publishes to a topic through a Kafka REST proxy
//! - [`HttpCallbackSink`]: POSTs the record to a configured endpoint
//! - [`FileSink`]: appends a line per window to a local file
//! - [`LogSink`]: emits the record as a log event

pub mod file;
pub mod http;
pub mod topic;

pub use file::FileSink;
pub use http::{CallbackClient, HttpCallbackSink};
pub use topic::TopicSink;

use crate::config::{SinkConfig, SinkKind};
use crate::counter::WindowResult;
use crate::error::{DeliveryError, FlowError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Delivers one window result.
    async fn deliver(&self, result: &WindowResult) -> Result<(), DeliveryError>;
}

/// Sink that only logs each window.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl ResultSink for LogSink {
    async fn deliver(&self, result: &WindowResult) -> Result<(), DeliveryError> {
        let payload = serde_json::to_string(result)?;
        info!(%payload, "Window report");
        Ok(())
    }
}

/// Builds the configured sink.
pub fn from_config(config: &SinkConfig, client: CallbackClient) -> Result<Arc<dyn ResultSink>, FlowError> {
    let sink: Arc<dyn ResultSink> = match config.kind {
        SinkKind::Topic => Arc::new(TopicSink::new(client, &config.proxy_url, &config.topic)),
        SinkKind::Http => {
            let endpoint = config
                .endpoint
                .as_deref()
                .filter(|endpoint| !endpoint.is_empty())
                .ok_or_else(|| FlowError::Setting {
                    key: "sink.endpoint",
                    reason: "required when sink.kind = \"http\"".to_string(),
                })?;
            Arc::new(HttpCallbackSink::new(client, endpoint))
        }
        SinkKind::File => Arc::new(FileSink::new(&config.path)),
        SinkKind::Log => Arc::new(LogSink),
    };
    Ok(sink)
}
