//! Timer-driven window retirement.
//!
//! `Idle → AwaitingTick → Retiring → Delivering → AwaitingTick → …`
//!
//! Each tick retires the current window and hands the result to the sink in
//! a detached task bounded by the delivery timeout, so a slow or failing sink
//! never delays the next tick.

use crate::backend::CountingBackend;
use crate::counter::WindowResult;
use crate::error::DeliveryError;
use crate::sink::ResultSink;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    AwaitingTick,
    Retiring,
    Delivering,
}

/// Sole caller of [`CountingBackend::retire`].
pub struct WindowScheduler {
    backend: Arc<dyn CountingBackend>,
    sink: Arc<dyn ResultSink>,
    interval: Duration,
    delivery_timeout: Duration,
    state: watch::Sender<SchedulerState>,
}

impl WindowScheduler {
    pub fn new(
        backend: Arc<dyn CountingBackend>,
        sink: Arc<dyn ResultSink>,
        interval: Duration,
        delivery_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            backend,
            sink,
            interval,
            delivery_timeout,
            state,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Retires the current window and starts its delivery.
    ///
    /// Returns the delivery task, or `None` when the backend failed to
    /// produce a result.
    pub async fn close_window(&self) -> Option<JoinHandle<()>> {
        self.state.send_replace(SchedulerState::Retiring);
        let result = match self.backend.retire().await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Failed to retire window");
                return None;
            }
        };
        info!(
            unique_count = result.unique_count,
            timestamp = %result.timestamp,
            "Window closed"
        );

        self.state.send_replace(SchedulerState::Delivering);
        let sink = self.sink.clone();
        let timeout = self.delivery_timeout;
        Some(tokio::spawn(async move {
            match deliver(sink.as_ref(), &result, timeout).await {
                Ok(()) => debug!(unique_count = result.unique_count, "Window delivered"),
                Err(e) => warn!(
                    error = %e,
                    unique_count = result.unique_count,
                    "Window delivery failed"
                ),
            }
        }))
    }

    /// Closes a window every interval until `shutdown` resolves.
    ///
    /// The first window closes one full interval after start. Missed ticks
    /// are skipped rather than replayed.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);
        tokio::pin!(shutdown);

        info!(interval_secs = self.interval.as_secs_f64(), "Window scheduler started");
        self.state.send_replace(SchedulerState::AwaitingTick);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(_) = ticks.next() => {
                    self.close_window().await;
                    self.state.send_replace(SchedulerState::AwaitingTick);
                }
            }
        }
        self.state.send_replace(SchedulerState::Idle);
        info!("Window scheduler stopped");
    }
}

async fn deliver(sink: &dyn ResultSink, result: &WindowResult, timeout: Duration) -> Result<(), DeliveryError> {
    match tokio::time::timeout(timeout, sink.deliver(result)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(DeliveryError::Timeout),
    }
}
