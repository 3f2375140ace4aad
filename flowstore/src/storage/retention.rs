use crate::error::Result;
use crate::storage::KeyStore;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Periodically deletes keys last seen before the retention horizon.
pub struct RetentionSweeper {
    store: Arc<dyn KeyStore>,
    retention: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn KeyStore>, retention: Duration, interval: Duration) -> Self {
        Self {
            store,
            retention,
            interval,
        }
    }

    /// Oldest `last_seen` that survives a sweep performed at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let retention = chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::MAX);
        now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Runs one sweep and returns the number of rows removed.
    pub async fn sweep_once(&self) -> Result<usize> {
        let cutoff = self.cutoff(Utc::now());
        let removed = self.store.delete_before(cutoff).await?;
        info!(%cutoff, removed, "Pruned expired keys");
        Ok(removed)
    }

    /// Sweeps every interval until `shutdown` resolves. A failed sweep is
    /// logged and retried on the next period.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "Retention sweep failed");
                    }
                }
            }
        }

        info!("Retention sweeper stopped");
    }
}
