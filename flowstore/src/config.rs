//! Key store configuration.
//!
//! The store section is usually loaded as part of the host application's
//! settings, e.g.:
//!
//! ```toml
//! [store]
//! engine = "duckdb"
//! connection = "flowcount.db"   # ":memory:" for a throwaway database
//! pool_max = 8
//! retention_secs = 120
//! cleanup_interval_secs = 60
//! options = { threads = "4" }
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Store backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Engine type (currently only "duckdb")
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Connection string: a database path or ":memory:"
    #[serde(default = "default_connection")]
    pub connection: String,
    /// Number of pooled connections
    #[serde(default = "default_pool_max")]
    pub pool_max: usize,
    /// Rows older than this are pruned by the retention sweeper
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Period of the retention sweeper
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Engine-specific options
    #[serde(default)]
    pub options: HashMap<String, String>,
}

fn default_engine() -> String {
    "duckdb".to_string()
}

fn default_connection() -> String {
    ":memory:".to_string()
}

fn default_pool_max() -> usize {
    8
}

fn default_retention_secs() -> u64 {
    120
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

impl StoreConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    /// Options handed to the backend, with the pool size folded in.
    pub fn backend_options(&self) -> HashMap<String, String> {
        let mut options = self.options.clone();
        options
            .entry("pool_max".to_string())
            .or_insert_with(|| self.pool_max.to_string());
        options
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            connection: default_connection(),
            pool_max: default_pool_max(),
            retention_secs: default_retention_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            options: HashMap::new(),
        }
    }
}
