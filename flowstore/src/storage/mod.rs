//! Storage backends for durable key presence.
//!
//! This module provides the key store abstraction used by the persistent
//! counting backend:
//! - `duckdb`: embedded DuckDB store, file-backed or in-memory
//! - `pool`: fixed-size connection pool shared by the DuckDB store
//! - `retention`: periodic pruning of rows older than the retention horizon
//!
//! Each backend implements the `KeyStore` trait. A key store records the last
//! time each key was seen; the number of distinct keys in a window is the
//! number of rows whose `last_seen` falls in `[from, to)`.

pub mod duckdb;
pub mod pool;
pub mod retention;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Durable, time-indexed key presence store.
#[async_trait]
pub trait KeyStore: Send + Sync + 'static {
    /// Create tables and indexes if they do not exist.
    async fn init(&self) -> Result<()>;

    /// Record that `key` was seen at `seen_at`, replacing any earlier sighting.
    async fn upsert_key(&self, key: &str, seen_at: DateTime<Utc>) -> Result<()>;

    /// Count distinct keys last seen in the half-open range `[from, to)`.
    async fn count_distinct(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<u64>;

    /// Delete keys last seen strictly before `cutoff`. Returns the number of rows removed.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Create a new instance with the given options.
    /// The connection string and options are backend-specific.
    fn new_with_options(connection_string: &str, options: &HashMap<String, String>) -> Result<Self>
    where
        Self: Sized;
}
