//! Process-wide sandbox health counters.
//!
//! One `SandboxMetrics` is constructed per process and shared by `Arc` with
//! every component that records an outcome. Counters are relaxed atomics:
//! exact counts are advisory, lost updates are not acceptable.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// An outcome worth counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MetricEvent {
    /// Sandbox reported ready.
    CreationSuccess,
    /// Sandbox creation or readiness wait failed.
    CreationFailed,
    /// Remote command failed with a 502-class error.
    Exec502,
    /// Remote command failed with a 409-class error.
    Exec409,
    /// Remote command failed with any other error.
    ExecOther,
    /// Repository clone failed after its own retries.
    CloneFailed,
    /// Sandbox bootstrap completed.
    SetupSuccess,
    /// Sandbox bootstrap exhausted every attempt.
    SetupFailed,
    /// A remote command was retried.
    ExecRetry,
    /// A whole setup attempt was retried on a fresh sandbox.
    SetupRetry,
}

/// Shared counters for sandbox setup and command execution.
#[derive(Debug, Default)]
pub(crate) struct SandboxMetrics {
    creation_success: AtomicU64,
    creation_failed: AtomicU64,
    exec_502_errors: AtomicU64,
    exec_409_errors: AtomicU64,
    exec_other_errors: AtomicU64,
    clone_failed: AtomicU64,
    setup_success: AtomicU64,
    setup_failed: AtomicU64,
    exec_retries: AtomicU64,
    setup_retries: AtomicU64,
    last_log_count: AtomicU64,
}

impl SandboxMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter for `event`.
    pub fn record(&self, event: MetricEvent) {
        self.counter(event).fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            creation_success: get(&self.creation_success),
            creation_failed: get(&self.creation_failed),
            exec_502_errors: get(&self.exec_502_errors),
            exec_409_errors: get(&self.exec_409_errors),
            exec_other_errors: get(&self.exec_other_errors),
            clone_failed: get(&self.clone_failed),
            setup_success: get(&self.setup_success),
            setup_failed: get(&self.setup_failed),
            exec_retries: get(&self.exec_retries),
            setup_retries: get(&self.setup_retries),
        }
    }

    /// Logs a metrics line when the number of completed setups reaches a
    /// multiple of `every_n`. Each multiple is logged at most once.
    ///
    /// Returns whether a line was logged.
    pub fn maybe_log(&self, every_n: u64) -> bool {
        if every_n == 0 {
            return false;
        }

        let snapshot = self.snapshot();
        let total = snapshot.setups();
        if total == 0 || total % every_n != 0 {
            return false;
        }

        if self.last_log_count.swap(total, Ordering::Relaxed) == total {
            return false;
        }

        info!("{}", snapshot);
        true
    }

    fn counter(&self, event: MetricEvent) -> &AtomicU64 {
        match event {
            MetricEvent::CreationSuccess => &self.creation_success,
            MetricEvent::CreationFailed => &self.creation_failed,
            MetricEvent::Exec502 => &self.exec_502_errors,
            MetricEvent::Exec409 => &self.exec_409_errors,
            MetricEvent::ExecOther => &self.exec_other_errors,
            MetricEvent::CloneFailed => &self.clone_failed,
            MetricEvent::SetupSuccess => &self.setup_success,
            MetricEvent::SetupFailed => &self.setup_failed,
            MetricEvent::ExecRetry => &self.exec_retries,
            MetricEvent::SetupRetry => &self.setup_retries,
        }
    }
}

/// Read-only view of [`SandboxMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub(crate) struct MetricsSnapshot {
    pub creation_success: u64,
    pub creation_failed: u64,
    pub exec_502_errors: u64,
    pub exec_409_errors: u64,
    pub exec_other_errors: u64,
    pub clone_failed: u64,
    pub setup_success: u64,
    pub setup_failed: u64,
    pub exec_retries: u64,
    pub setup_retries: u64,
}

impl MetricsSnapshot {
    /// Completed setups, successful or not.
    pub fn setups(&self) -> u64 {
        self.setup_success + self.setup_failed
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[METRICS] setups={} ok={} fail={} 502s={} 409s={} clone_fail={} retries={}",
            self.setups(),
            self.setup_success,
            self.setup_failed,
            self.exec_502_errors,
            self.exec_409_errors,
            self.clone_failed,
            self.setup_retries,
        )
    }
}
