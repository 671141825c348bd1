//! Metric instrument factories for taskpool.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`,
//! so instruments are no-ops until telemetry is initialized with an
//! endpoint.

use opentelemetry::metrics::{Counter, Histogram, Meter};

use super::INSTRUMENTATION_SCOPE;

fn meter() -> Meter {
    opentelemetry::global::meter(INSTRUMENTATION_SCOPE)
}

/// Counter: tasks admitted to the queue.
pub fn task_submitted() -> Counter<u64> {
    meter()
        .u64_counter("taskpool.task.submitted")
        .with_description("Number of tasks admitted to the queue")
        .build()
}

/// Counter: submissions rejected because the queue was full.
pub fn task_rejected() -> Counter<u64> {
    meter()
        .u64_counter("taskpool.task.rejected")
        .with_description("Number of submissions rejected with queue full")
        .build()
}

/// Counter: tasks the processor finished.
/// Labels: `result` ("ok" | "error").
pub fn task_completed() -> Counter<u64> {
    meter()
        .u64_counter("taskpool.task.completed")
        .with_description("Number of tasks executed by a worker")
        .build()
}

/// Counter: results discarded because the submitter stopped listening.
pub fn task_dropped() -> Counter<u64> {
    meter()
        .u64_counter("taskpool.task.dropped")
        .with_description("Number of results discarded with no receiver")
        .build()
}

/// Counter: queued tasks discarded at shutdown.
pub fn task_abandoned() -> Counter<u64> {
    meter()
        .u64_counter("taskpool.task.abandoned")
        .with_description("Number of queued tasks discarded at shutdown")
        .build()
}

/// Histogram: processor duration in milliseconds.
/// Labels: `workflow`.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("taskpool.task.duration_ms")
        .with_description("Time spent in the processor per task")
        .with_unit("ms")
        .build()
}
