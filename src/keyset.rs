use dashmap::DashSet;
use parking_lot::RwLock;

/// Concurrent set of keys.
///
/// Inserts and counts run concurrently against a sharded set. `clear` takes
/// the set exclusively, so a racing `insert` or `count` observes either the
/// whole set or the emptied one, never a partially cleared view.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: DashSet<String>,
    clearing: RwLock<()>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key` if absent.
    pub fn insert(&self, key: &str) {
        let _shared = self.clearing.read();
        if !self.keys.contains(key) {
            self.keys.insert(key.to_owned());
        }
    }

    /// Number of distinct keys.
    pub fn count(&self) -> usize {
        let _shared = self.clearing.read();
        self.keys.len()
    }

    /// Removes every key. Shard allocations are kept for reuse.
    pub fn clear(&self) {
        let _exclusive = self.clearing.write();
        self.keys.clear();
    }
}
