//! The outcome delivered back to a submitter.

use chrono::{DateTime, Utc};

use crate::model::TaskId;
use crate::processor::ProcessorError;

/// Result of executing one task. Exactly one is produced per task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: TaskId,

    /// Index of the worker that ran the task.
    pub worker_id: usize,

    /// Processor output, or the processor's error passed through untouched.
    pub outcome: Result<String, ProcessorError>,

    /// Wall time spent inside the processor.
    pub duration_ms: u64,

    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    /// Output payload; `None` when the processor failed.
    pub fn output(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }

    /// Processor error; `None` on success.
    pub fn error(&self) -> Option<&ProcessorError> {
        self.outcome.as_ref().err()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn into_outcome(self) -> Result<String, ProcessorError> {
        self.outcome
    }
}
