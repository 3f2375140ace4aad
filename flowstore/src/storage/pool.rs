use crate::error::{Result, StoreError};
use duckdb::{Config, Connection};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

pub const IN_MEMORY: &str = ":memory:";

/// Fixed-size pool of connections to a single DuckDB database.
///
/// Every connection after the first is a clone of it, so an in-memory
/// database is shared by the whole pool rather than one per connection.
pub struct ConnectionPool {
    connections: Vec<Arc<Mutex<Connection>>>,
    next: AtomicUsize,
}

impl ConnectionPool {
    /// Opens `size` connections to `connection_string`.
    pub fn open(connection_string: &str, size: usize, config: Config) -> Result<Self> {
        if size == 0 {
            return Err(StoreError::InvalidOption {
                key: "pool_max".to_string(),
                reason: "pool must hold at least one connection".to_string(),
            });
        }

        let first = if connection_string == IN_MEMORY {
            Connection::open_in_memory_with_flags(config)
        } else {
            Connection::open_with_flags(connection_string, config)
        }
        .map_err(|e| StoreError::Connection(format!("{connection_string}: {e}")))?;

        let mut connections = Vec::with_capacity(size);
        for _ in 1..size {
            let clone = first
                .try_clone()
                .map_err(|e| StoreError::Pool(format!("failed to clone connection: {e}")))?;
            connections.push(Arc::new(Mutex::new(clone)));
        }
        connections.insert(0, Arc::new(Mutex::new(first)));

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    /// Number of pooled connections.
    pub fn size(&self) -> usize {
        self.connections.len()
    }

    /// Checks out a connection, preferring an idle one, starting from the
    /// next round-robin slot. Waits on that slot if every connection is busy.
    pub async fn get(&self) -> MutexGuard<'_, Connection> {
        let size = self.connections.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % size;

        for offset in 0..size {
            if let Ok(guard) = self.connections[(start + offset) % size].try_lock() {
                return guard;
            }
        }

        self.connections[start].lock().await
    }
}
