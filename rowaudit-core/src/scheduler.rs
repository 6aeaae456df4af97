//! Periodic and final metric flushing.
//!
//! ```text
//! Idle -(start, streaming)-> Scheduled -(tick)-> Flushing -> Scheduled
//! Scheduled -(close)-> FinalFlush -> Stopped
//! ```
//!
//! Batch jobs never leave `Idle` until close. Ticks that come due while a
//! flush is still running are skipped rather than queued, so one stage
//! instance has at most one merge in flight against the shared store.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::JobMode;
use crate::error::QualityError;
use crate::metrics::{MetricsSnapshot, RowMetricsTree};
use crate::reporter::{MetricsReporter, flush};

/// Lifecycle state of a [`PeriodicFlushScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scheduled,
    Flushing,
    FinalFlush,
    Stopped,
}

/// State shared between the scheduler handle and its timer task.
struct FlushContext {
    reporter: Arc<dyn MetricsReporter>,
    metrics: Arc<RowMetricsTree>,
    /// Held for the duration of every flush
    gate: Mutex<()>,
    state: watch::Sender<SchedulerState>,
}

impl FlushContext {
    /// Runs one periodic flush unless another is in flight or nothing was
    /// dealt since the last one.
    async fn periodic_flush(&self) -> Option<MetricsSnapshot> {
        if self.metrics.table().dealt() == 0 {
            tracing::trace!("Nothing dealt since last flush; skipping tick");
            return None;
        }
        let Ok(_guard) = self.gate.try_lock() else {
            tracing::debug!("Flush already in flight; coalescing tick");
            return None;
        };

        let previous = self.state.send_replace(SchedulerState::Flushing);
        let result = self.run_flush().await;
        self.state.send_replace(previous);
        result
    }

    async fn run_flush(&self) -> Option<MetricsSnapshot> {
        match flush(self.reporter.as_ref(), &self.metrics).await {
            Ok(snapshot) => {
                tracing::debug!(
                    "Flushed {} dealt / {} dirty rows to {}",
                    snapshot.table.dealt,
                    snapshot.table.dirty,
                    self.reporter.describe()
                );
                Some(snapshot)
            }
            Err(e) => {
                tracing::warn!(
                    "Metric flush to {} failed, counters kept for next attempt: {}",
                    self.reporter.describe(),
                    e
                );
                None
            }
        }
    }
}

/// Drives metric flushes for one stage instance.
pub struct PeriodicFlushScheduler {
    context: Arc<FlushContext>,
    job_mode: JobMode,
    interval: Duration,
    final_flush: bool,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PeriodicFlushScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicFlushScheduler")
            .field("reporter", &self.context.reporter.describe())
            .field("job_mode", &self.job_mode)
            .field("interval", &self.interval)
            .field("final_flush", &self.final_flush)
            .field("state", &self.state())
            .finish()
    }
}

impl PeriodicFlushScheduler {
    /// Creates an idle scheduler.
    pub fn new(
        reporter: Arc<dyn MetricsReporter>,
        metrics: Arc<RowMetricsTree>,
        job_mode: JobMode,
        interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            context: Arc::new(FlushContext {
                reporter,
                metrics,
                gate: Mutex::new(()),
                state,
            }),
            job_mode,
            interval,
            final_flush: true,
            shutdown: None,
            task: None,
        }
    }

    /// Builder method to skip the flush at close (preview runs).
    pub fn with_final_flush(mut self, enabled: bool) -> Self {
        self.final_flush = enabled;
        self
    }

    pub fn state(&self) -> SchedulerState {
        *self.context.state.borrow()
    }

    /// Watches state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.context.state.subscribe()
    }

    /// Starts the periodic timer for streaming jobs; batch jobs stay idle.
    ///
    /// # Errors
    /// Returns a configuration error if called outside a Tokio runtime in
    /// streaming mode, or with a zero or unrepresentable interval.
    pub fn start(&mut self) -> crate::Result<()> {
        if !self.job_mode.is_streaming() || self.task.is_some() {
            return Ok(());
        }
        if self.interval.is_zero() {
            return Err(QualityError::configuration(
                "flush interval must be greater than zero",
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            QualityError::configuration("streaming flush requires a Tokio runtime")
        })?;
        let first_tick = Instant::now().checked_add(self.interval).ok_or_else(|| {
            QualityError::configuration(format!(
                "flush interval {:?} is too large to schedule",
                self.interval
            ))
        })?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let context = Arc::clone(&self.context);
        let period = self.interval;

        context.state.send_replace(SchedulerState::Scheduled);
        self.task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        context.periodic_flush().await;
                    }
                }
            }
        }));
        self.shutdown = Some(shutdown_tx);

        tracing::debug!(
            "Scheduled metric flush every {:?} to {}",
            period,
            self.context.reporter.describe()
        );
        Ok(())
    }

    /// Runs one periodic-style flush now, coalescing with any in flight.
    pub async fn flush_now(&self) -> Option<MetricsSnapshot> {
        self.context.periodic_flush().await
    }

    /// Stops the timer, waits for an in-flight flush, then performs the final
    /// flush.
    ///
    /// Returns the snapshot delivered by the final flush, or `None` when it
    /// was skipped or failed. Calling `close` again is a no-op.
    pub async fn close(&mut self) -> Option<MetricsSnapshot> {
        if self.state() == SchedulerState::Stopped {
            return None;
        }

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!("Flush timer task ended abnormally: {}", e);
        }

        let delivered = if self.final_flush {
            // a manual flush may still hold the gate
            let _guard = self.context.gate.lock().await;
            self.context.state.send_replace(SchedulerState::FinalFlush);
            self.context.run_flush().await
        } else {
            tracing::debug!("Final flush suppressed for preview run");
            None
        };

        self.context.reporter.close().await;
        self.context.state.send_replace(SchedulerState::Stopped);
        delivered
    }
}

impl Drop for PeriodicFlushScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
