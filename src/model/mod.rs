//! Core data model.
//!
//! A task is one unit of requested work: an opaque workflow identifier and
//! payload, correlation metadata, the submitter's cancellation context, and
//! a private single-slot channel the scheduler answers on exactly once.

pub mod context;
pub mod result;
pub mod task;

pub use context::TaskContext;
pub use result::TaskResult;
pub use task::{NewTask, Payload, Task, TaskHandle, TaskId, TaskRequest};
