//! flowcount: windowed distinct-key counting.
//!
//! Keys arrive one per ingest request and are counted once per fixed window.
//! At every window boundary the scheduler retires the window and hands its
//! `{timestamp, unique_count}` record to a result sink.
//!
//! # Example
//!
//! ```rust,no_run
//! use flowcount::{LogSink, MemoryBackend, WindowScheduler, WindowedCounter};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let counter = Arc::new(WindowedCounter::new());
//!     let backend = Arc::new(MemoryBackend::new(counter.clone()));
//!
//!     let scheduler = WindowScheduler::new(
//!         backend,
//!         Arc::new(LogSink),
//!         Duration::from_secs(60),
//!         Duration::from_millis(500),
//!     );
//!
//!     counter.insert("user-1");
//!     counter.insert("user-2");
//!     counter.insert("user-1");
//!
//!     // Closes the window and logs `unique_count = 2`.
//!     if let Some(delivery) = scheduler.close_window().await {
//!         let _ = delivery.await;
//!     }
//! }
//! ```

pub mod backend;
pub mod config;
pub mod counter;
pub mod error;
pub mod ingest;
pub mod keyset;
pub mod scheduler;
pub mod shutdown;
pub mod sink;
pub mod telemetry;

pub use backend::{open_store, CountingBackend, MemoryBackend, StoreBackend};
pub use config::{CliArgs, Settings};
pub use counter::{WindowResult, WindowedCounter};
pub use error::{BackendError, DeliveryError, FlowError, Result};
pub use ingest::{IngestParams, IngestServer};
pub use keyset::KeySet;
pub use scheduler::{SchedulerState, WindowScheduler};
pub use sink::{CallbackClient, FileSink, HttpCallbackSink, LogSink, ResultSink, TopicSink};

#[cfg(test)]
mod tests;
