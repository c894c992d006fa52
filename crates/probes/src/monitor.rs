//! Cancellation monitor for in-flight transfers
//!
//! A background task re-reads the owning task record on a fixed interval and
//! publishes its verdict through a pair of atomic flags. The transfer loop is
//! the only reader. The poller stores `stopped` before `valid` with release
//! ordering on `valid`, and readers load `valid` with acquire ordering, so a
//! reader that observes a verdict's `valid` also observes its `stopped`.

use crate::constants::MIN_POLL_INTERVAL;
use netkeeper_core::{IdentityToken, TaskId, TaskRecord, TaskStore};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Outcome of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Task exists, identity matches, and it is marked running
    Running,
    /// Task was deleted or rescheduled under a new identity
    Invalidated,
    /// Task exists with the same identity but was stopped
    Stopped,
}

impl Verdict {
    /// `(valid, stopped)` pair published for this verdict
    pub fn flags(self) -> (bool, bool) {
        match self {
            Verdict::Running => (true, false),
            Verdict::Invalidated => (false, false),
            Verdict::Stopped => (false, true),
        }
    }
}

/// Classify a freshly read record against the identity a transfer started with
pub fn evaluate(record: Option<TaskRecord>, identity: IdentityToken) -> Verdict {
    match record {
        None => Verdict::Invalidated,
        Some(record) if record.identity != identity => Verdict::Invalidated,
        Some(record) if record.running => Verdict::Running,
        Some(_) => Verdict::Stopped,
    }
}

/// Flag pair shared between the poller and the transfer loop
#[derive(Debug)]
pub struct TransferFlags {
    valid: AtomicBool,
    stopped: AtomicBool,
}

impl Default for TransferFlags {
    fn default() -> Self {
        Self {
            valid: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }
}

impl TransferFlags {
    pub fn publish(&self, valid: bool, stopped: bool) {
        self.stopped.store(stopped, Ordering::Relaxed);
        self.valid.store(valid, Ordering::Release);
    }

    pub fn valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// `(valid, stopped)` as last published
    pub fn snapshot(&self) -> (bool, bool) {
        let valid = self.valid();
        (valid, self.stopped())
    }
}

/// Periodic re-check of one task
#[derive(Clone)]
pub struct CancellationMonitor {
    store: Arc<dyn TaskStore>,
    task_id: TaskId,
    identity: IdentityToken,
    interval: Duration,
}

impl std::fmt::Debug for CancellationMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationMonitor")
            .field("task_id", &self.task_id)
            .field("identity", &self.identity)
            .field("interval", &self.interval)
            .finish()
    }
}

impl CancellationMonitor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        task_id: TaskId,
        identity: IdentityToken,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            task_id,
            identity,
            interval,
        }
    }

    /// Read the record once and publish the verdict.
    ///
    /// Store failures leave the transfer valid.
    pub async fn poll(&self, flags: &TransferFlags) {
        let store = Arc::clone(&self.store);
        let task_id = self.task_id;
        let read = tokio::task::spawn_blocking(move || store.read_task(task_id)).await;

        match read {
            Ok(Ok(record)) => {
                let verdict = evaluate(record, self.identity);
                trace!("Task {} polled: {:?}", self.task_id, verdict);
                let (valid, stopped) = verdict.flags();
                if flags.snapshot() != (valid, stopped) {
                    info!("Task {} is now {:?}", self.task_id, verdict);
                }
                flags.publish(valid, stopped);
            }
            Ok(Err(e)) => {
                warn!("Polling task {} failed, keeping transfer alive: {}", self.task_id, e);
                flags.publish(true, false);
            }
            Err(e) => {
                warn!("Poll of task {} did not complete: {}", self.task_id, e);
                flags.publish(true, false);
            }
        }
    }

    /// Start polling in the background.
    ///
    /// `interrupt` is the caller's cancellation token; it is folded into
    /// [`MonitorHandle::is_valid`] but does not stop the poller.
    pub fn start(self, interrupt: CancellationToken) -> MonitorHandle {
        let flags = Arc::new(TransferFlags::default());
        let shutdown = CancellationToken::new();

        let task = {
            let flags = Arc::clone(&flags);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let period = self.interval.max(MIN_POLL_INTERVAL);
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                debug!("Monitoring task {} every {:?}", self.task_id, period);

                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = ticker.tick() => self.poll(&flags).await,
                    }
                }
                trace!("Monitor for task {} finished", self.task_id);
            })
        };

        MonitorHandle {
            flags,
            interrupt,
            shutdown,
            task: Some(task),
        }
    }
}

/// Handle to a running monitor; dropping it aborts the poller
#[derive(Debug)]
pub struct MonitorHandle {
    flags: Arc<TransferFlags>,
    interrupt: CancellationToken,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Whether the transfer may continue
    pub fn is_valid(&self) -> bool {
        !self.interrupt.is_cancelled() && self.flags.valid()
    }

    /// Whether the caller's token has fired
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Shut the poller down, wait for it, and return the last `(valid, stopped)`
    pub async fn stop(mut self) -> (bool, bool) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Monitor task ended abnormally: {}", e);
            }
        }
        self.flags.snapshot()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
