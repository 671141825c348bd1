//! Scheduler counters.
//!
//! In-process atomics back [`SchedulerStats`] snapshots; each update is
//! mirrored to the OTel instruments in `telemetry::metrics`.

use opentelemetry::KeyValue;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::telemetry::metrics;

/// Point-in-time view of a scheduler's activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SchedulerStats {
    /// Tasks admitted to the queue.
    pub submitted: u64,
    /// Submissions refused with queue full.
    pub rejected: u64,
    /// Tasks whose processor call returned `Ok`.
    pub completed: u64,
    /// Tasks whose processor call returned `Err`.
    pub failed: u64,
    /// Results discarded because nobody was listening.
    pub dropped: u64,
    /// Queued tasks discarded at shutdown.
    pub abandoned: u64,
    pub queue_depth: usize,
    pub live_workers: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    abandoned: AtomicU64,
}

impl Counters {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        metrics::task_submitted().add(1, &[]);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        metrics::task_rejected().add(1, &[]);
    }

    pub(crate) fn record_executed(&self, workflow_id: &str, success: bool, duration_ms: u64) {
        let counter = if success {
            &self.completed
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let result = if success { "ok" } else { "error" };
        metrics::task_completed().add(1, &[KeyValue::new("result", result)]);
        metrics::task_duration_ms().record(
            duration_ms as f64,
            &[KeyValue::new("workflow", workflow_id.to_string())],
        );
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::task_dropped().add(1, &[]);
    }

    pub(crate) fn record_abandoned(&self, count: usize) {
        self.abandoned.fetch_add(count as u64, Ordering::Relaxed);
        metrics::task_abandoned().add(count as u64, &[]);
    }

    pub(crate) fn snapshot(&self, queue_depth: usize, live_workers: usize) -> SchedulerStats {
        SchedulerStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            queue_depth,
            live_workers,
        }
    }
}
