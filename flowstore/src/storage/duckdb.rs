//! DuckDB key store implementation.
//!
//! Keys live in a single table:
//!
//! ```sql
//! CREATE TABLE flow_keys (
//!     unique_id VARCHAR PRIMARY KEY,
//!     last_seen BIGINT NOT NULL      -- Unix milliseconds
//! );
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [store]
//! engine = "duckdb"
//! connection = ":memory:"  # Use ":memory:" for in-memory or a file path
//! pool_max = 8
//! options = {
//!     threads = "4"        # Optional: DuckDB worker threads
//! }
//! ```

use crate::error::{Result, StoreError};
use crate::storage::pool::ConnectionPool;
use crate::storage::KeyStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{params, Config};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_POOL_MAX: usize = 8;

const CREATE_TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS flow_keys (
        unique_id VARCHAR PRIMARY KEY,
        last_seen BIGINT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_flow_keys_last_seen ON flow_keys(last_seen);
"#;

const UPSERT_KEY: &str = r#"
    INSERT INTO flow_keys (unique_id, last_seen)
    VALUES (?, ?)
    ON CONFLICT (unique_id)
    DO UPDATE SET last_seen = EXCLUDED.last_seen
"#;

const COUNT_DISTINCT: &str = r#"
    SELECT COUNT(DISTINCT unique_id)
    FROM flow_keys
    WHERE last_seen >= ? AND last_seen < ?
"#;

const DELETE_BEFORE: &str = "DELETE FROM flow_keys WHERE last_seen < ?";

/// DuckDB-backed key store.
#[derive(Clone)]
pub struct DuckDbStore {
    pool: Arc<ConnectionPool>,
}

impl DuckDbStore {
    /// Opens a store with `pool_max` connections.
    pub fn new(connection_string: &str, pool_max: usize, config: Config) -> Result<Self> {
        let pool = ConnectionPool::open(connection_string, pool_max, config)?;
        debug!(connection = connection_string, pool_size = pool.size(), "Opened DuckDB key store");
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Creates a store over a private in-memory database.
    pub fn new_in_memory() -> Result<Self> {
        Self::new(crate::storage::pool::IN_MEMORY, 1, Config::default())
    }

    fn parse_option<T: std::str::FromStr>(options: &HashMap<String, String>, key: &str) -> Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        options
            .get(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| StoreError::InvalidOption {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}

#[async_trait]
impl KeyStore for DuckDbStore {
    async fn init(&self) -> Result<()> {
        let conn = self.pool.get().await;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(())
    }

    async fn upsert_key(&self, key: &str, seen_at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.pool.get().await;
        let tx = conn.transaction()?;
        tx.execute(UPSERT_KEY, params![key, seen_at.timestamp_millis()])?;
        tx.commit()?;
        Ok(())
    }

    async fn count_distinct(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<u64> {
        let conn = self.pool.get().await;
        let count: i64 = conn.query_row(
            COUNT_DISTINCT,
            params![from.timestamp_millis(), to.timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.pool.get().await;
        let removed = conn.execute(DELETE_BEFORE, params![cutoff.timestamp_millis()])?;
        Ok(removed)
    }

    fn new_with_options(connection_string: &str, options: &HashMap<String, String>) -> Result<Self> {
        let pool_max = Self::parse_option::<usize>(options, "pool_max")?.unwrap_or(DEFAULT_POOL_MAX);

        let mut config = Config::default();
        if let Some(threads) = Self::parse_option::<i64>(options, "threads")? {
            config = config.threads(threads)?;
        }

        Self::new(connection_string, pool_max, config)
    }
}
