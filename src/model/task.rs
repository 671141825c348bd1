//! Tasks, their payloads, and the submitter-side result handle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{TaskContext, TaskResult};

// ---------------------------------------------------------------------------
// Identity and payload
// ---------------------------------------------------------------------------

/// Newtype for task IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Opaque task input. The scheduler passes it through unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Text(String),
    Json(serde_json::Value),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            Payload::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Text(_) => None,
            Payload::Json(v) => Some(v),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(s) => f.write_str(s),
            Payload::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(v: serde_json::Value) -> Self {
        Payload::Json(v)
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// The part of a task the processor sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub id: TaskId,

    /// Which logic to run. Interpreted only by the processor.
    pub workflow_id: String,

    pub input: Payload,

    /// Correlation metadata, passed through without validation.
    pub user_id: Option<String>,
    pub archive_id: Option<String>,

    pub submitted_at: DateTime<Utc>,
}

/// A unit of work ready for submission.
///
/// Built together with its [`TaskHandle`] by [`NewTask::into_task`], so every
/// task carries a live single-slot result channel. `Scheduler::submit` takes
/// it by value; a task cannot be submitted twice.
#[derive(Debug)]
pub struct Task {
    context: TaskContext,
    request: TaskRequest,
    reply: oneshot::Sender<TaskResult>,
}

impl Task {
    pub fn id(&self) -> TaskId {
        self.request.id
    }

    pub fn request(&self) -> &TaskRequest {
        &self.request
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    pub(crate) fn into_parts(self) -> (TaskContext, TaskRequest, oneshot::Sender<TaskResult>) {
        (self.context, self.request, self.reply)
    }
}

/// Parameters for creating a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub workflow_id: String,
    pub input: Payload,
    pub user_id: Option<String>,
    pub archive_id: Option<String>,
    pub context: TaskContext,
}

impl NewTask {
    pub fn new(workflow_id: impl Into<String>, input: impl Into<Payload>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            input: input.into(),
            user_id: None,
            archive_id: None,
            context: TaskContext::new(),
        }
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn archive_id(mut self, archive_id: impl Into<String>) -> Self {
        self.archive_id = Some(archive_id.into());
        self
    }

    pub fn context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    /// Bound how long the submitter is willing to wait.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.context = self.context.with_timeout(timeout);
        self
    }

    /// Split into the task to submit and the handle to await its result on.
    pub fn into_task(self) -> (Task, TaskHandle) {
        let (reply, rx) = oneshot::channel();
        let id = TaskId::new();

        let request = TaskRequest {
            id,
            workflow_id: self.workflow_id,
            input: self.input,
            user_id: self.user_id,
            archive_id: self.archive_id,
            submitted_at: Utc::now(),
        };

        let handle = TaskHandle {
            id,
            context: self.context.clone(),
            rx,
        };

        let task = Task {
            context: self.context,
            request,
            reply,
        };

        (task, handle)
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Submitter side of a task's result channel.
///
/// Dropping the handle means the submitter has given up; the worker then
/// discards the result instead of waiting for a reader.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    context: TaskContext,
    rx: oneshot::Receiver<TaskResult>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Wait for the result.
    ///
    /// Returns [`Error::Cancelled`] if the task's context is cancelled or
    /// times out first, and [`Error::Abandoned`] if the scheduler dropped
    /// the task without running it.
    pub async fn wait(self) -> Result<TaskResult> {
        let TaskHandle { context, mut rx, .. } = self;

        tokio::select! {
            biased;
            res = &mut rx => res.map_err(|_| Error::Abandoned),
            _ = context.cancelled() => Err(Error::Cancelled),
        }
    }

    /// Take the result if it has already arrived.
    ///
    /// `Ok(None)` means still pending. Once a result has been taken, later
    /// calls report [`Error::Abandoned`].
    pub fn try_take(&mut self) -> Result<Option<TaskResult>> {
        match self.rx.try_recv() {
            Ok(result) => Ok(Some(result)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(Error::Abandoned),
        }
    }
}
