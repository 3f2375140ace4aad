//! Dual-buffer windowed unique counter.
//!
//! Two [`KeySet`]s alternate between the ACTIVE role (receiving inserts) and
//! the STANDBY role (being counted and cleared). The index of the active
//! buffer sits behind a task-fair `RwLock` that doubles as the insert gate:
//!
//! - `insert` holds a read guard while it writes into the active buffer, so
//!   the buffer it picked cannot change roles under it.
//! - `retire` takes the write guard only long enough to flip the index. A
//!   pending writer blocks new readers (the gate is closed) while readers
//!   already inside finish their insert first.
//!
//! Once the write guard drops, no insert can reach the retired buffer, so
//! its count is a consistent snapshot and clearing it races with nobody.
//! Counting, clearing and delivery all happen after inserts have resumed.

use crate::keyset::KeySet;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::error;

/// Longest any caller may wait on the gate. The gate is only ever closed
/// for an index flip, so exceeding this means it is stuck.
const GATE_DEADLINE: Duration = Duration::from_secs(5);

/// Result of closing one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowResult {
    /// Instant the window closed, serialized as RFC 3339.
    #[serde(serialize_with = "serialize_rfc3339")]
    pub timestamp: DateTime<Utc>,
    /// Distinct keys seen during the window.
    pub unique_count: u64,
}

impl WindowResult {
    pub fn new(timestamp: DateTime<Utc>, unique_count: u64) -> Self {
        Self {
            timestamp,
            unique_count,
        }
    }
}

fn serialize_rfc3339<S: Serializer>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Windowed unique counter.
///
/// Construct one per process and share it (behind an `Arc`) between the
/// ingest path and the scheduler. The scheduler must be the only caller of
/// [`retire`](Self::retire).
pub struct WindowedCounter {
    buffers: [KeySet; 2],
    active: RwLock<usize>,
    retiring: AtomicBool,
}

impl WindowedCounter {
    pub fn new() -> Self {
        Self {
            buffers: [KeySet::new(), KeySet::new()],
            active: RwLock::new(0),
            retiring: AtomicBool::new(false),
        }
    }

    /// Records `key` in the current window.
    ///
    /// Blocks only while a retirement is flipping buffers.
    pub fn insert(&self, key: &str) {
        let active = self.enter_gate();
        self.buffers[*active].insert(key);
    }

    /// Closes the current window and returns its distinct-key count.
    ///
    /// Keys inserted before the flip are counted here; keys inserted after
    /// it land in the next window.
    pub fn retire(&self) -> WindowResult {
        if self.retiring.swap(true, Ordering::AcqRel) {
            fatal("retire called while another retirement is in progress");
        }

        let (retired, closed_at) = {
            let mut active = self.close_gate();
            let retired = *active;
            *active = 1 - retired;
            (retired, Utc::now())
        };

        let buffer = &self.buffers[retired];
        let unique_count = buffer.count() as u64;
        buffer.clear();

        self.retiring.store(false, Ordering::Release);
        WindowResult::new(closed_at, unique_count)
    }

    /// Distinct keys in the window still open.
    ///
    /// Advisory: the window may close between reading the role and counting,
    /// in which case the count reflects whichever buffer was picked.
    pub fn running_count(&self) -> u64 {
        let active = *self.enter_gate();
        self.buffers[active].count() as u64
    }

    fn enter_gate(&self) -> RwLockReadGuard<'_, usize> {
        match self.active.try_read_for(GATE_DEADLINE) {
            Some(guard) => guard,
            None => fatal("insert gate stayed closed past its deadline"),
        }
    }

    fn close_gate(&self) -> RwLockWriteGuard<'_, usize> {
        match self.active.try_write_for(GATE_DEADLINE) {
            Some(guard) => guard,
            None => fatal("in-flight inserts did not drain before the buffer swap"),
        }
    }
}

impl Default for WindowedCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A stuck gate would silently drop every future insert, so it takes the
/// process down instead.
#[cold]
fn fatal(reason: &'static str) -> ! {
    error!(reason, "Windowed counter invariant violated, aborting");
    std::process::abort()
}
