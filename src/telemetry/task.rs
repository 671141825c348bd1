//! Task execution span helpers.

use tracing::Span;

use crate::model::TaskId;

/// Start a span covering one processor invocation.
///
/// `task.outcome` and `task.duration_ms` are declared empty and filled in
/// by [`record_task_outcome`].
pub fn start_task_span(workflow_id: &str, task_id: &TaskId, worker_id: usize) -> Span {
    tracing::info_span!(
        "task.execute",
        "task.workflow" = workflow_id,
        "task.id" = %task_id.0,
        "worker.id" = worker_id,
        "task.outcome" = tracing::field::Empty,
        "task.duration_ms" = tracing::field::Empty,
    )
}

pub fn record_task_outcome(span: &Span, success: bool, duration_ms: u64) {
    span.record("task.outcome", if success { "ok" } else { "error" });
    span.record("task.duration_ms", duration_ms);
}
