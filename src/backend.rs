//! Counting backends.
//!
//! A [`CountingBackend`] accepts keys and closes windows. Two realizations:
//! - [`MemoryBackend`]: the dual-buffer [`WindowedCounter`], no durability
//! - [`StoreBackend`]: upserts into a [`KeyStore`] and counts by time range

use crate::counter::{WindowResult, WindowedCounter};
use crate::error::{BackendError, FlowError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowstore_core::{DuckDbStore, KeyStore, StoreConfig};
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait CountingBackend: Send + Sync {
    /// Records one sighting of `key` in the current window.
    async fn insert(&self, key: &str) -> Result<(), BackendError>;

    /// Closes the current window. Only the scheduler calls this.
    async fn retire(&self) -> Result<WindowResult, BackendError>;

    /// Advisory count for the window still open.
    async fn running_count(&self) -> Result<u64, BackendError>;
}

/// In-memory backend over a shared [`WindowedCounter`].
#[derive(Clone, Default)]
pub struct MemoryBackend {
    counter: Arc<WindowedCounter>,
}

impl MemoryBackend {
    pub fn new(counter: Arc<WindowedCounter>) -> Self {
        Self { counter }
    }
}

#[async_trait]
impl CountingBackend for MemoryBackend {
    async fn insert(&self, key: &str) -> Result<(), BackendError> {
        self.counter.insert(key);
        Ok(())
    }

    async fn retire(&self) -> Result<WindowResult, BackendError> {
        Ok(self.counter.retire())
    }

    async fn running_count(&self) -> Result<u64, BackendError> {
        Ok(self.counter.running_count())
    }
}

/// Persistent backend: each insert upserts `(key, now)` and a window is the
/// half-open range `[window_start, closed_at)` over `last_seen`.
///
/// `window_start` doubles as the boundary gate. An insert holds the read
/// guard from taking its timestamp until the upsert commits; `retire` takes
/// the write guard only to pick `closed_at` and advance the start. The lock
/// is write-preferring, so once a retirement is waiting, later inserts are
/// stamped after `closed_at` and every committed row is on a definite side
/// of the boundary before the range is counted.
pub struct StoreBackend {
    store: Arc<dyn KeyStore>,
    window_start: RwLock<DateTime<Utc>>,
}

impl StoreBackend {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self {
            store,
            window_start: RwLock::new(Utc::now()),
        }
    }
}

#[async_trait]
impl CountingBackend for StoreBackend {
    async fn insert(&self, key: &str) -> Result<(), BackendError> {
        let _open = self.window_start.read().await;
        self.store.upsert_key(key, Utc::now()).await?;
        Ok(())
    }

    async fn retire(&self) -> Result<WindowResult, BackendError> {
        let (window_start, closed_at) = {
            let mut start = self.window_start.write().await;
            let closed_at = Utc::now();
            // The window advances even if the count fails, so no range is reported twice.
            (std::mem::replace(&mut *start, closed_at), closed_at)
        };
        let unique_count = self.store.count_distinct(window_start, closed_at).await?;
        Ok(WindowResult::new(closed_at, unique_count))
    }

    async fn running_count(&self) -> Result<u64, BackendError> {
        let window_start = *self.window_start.read().await;
        let until = Utc::now() + chrono::Duration::milliseconds(1);
        Ok(self.store.count_distinct(window_start, until).await?)
    }
}

/// Opens and initializes the key store named by `config.engine`.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn KeyStore>, FlowError> {
    let store: Arc<dyn KeyStore> = match config.engine.as_str() {
        "duckdb" => Arc::new(DuckDbStore::new_with_options(
            &config.connection,
            &config.backend_options(),
        )?),
        other => {
            return Err(FlowError::Setting {
                key: "store.engine",
                reason: format!("unsupported engine {other:?}"),
            })
        }
    };
    store.init().await?;
    Ok(store)
}
