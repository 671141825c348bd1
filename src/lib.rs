//! # taskpool
//!
//! Bounded-concurrency task scheduler.
//!
//! Submitters hand [`Task`]s to a [`Scheduler`]; admission is non-blocking
//! and fails fast with [`Error::QueueFull`] when the bounded queue is
//! saturated. A fixed pool of workers drains the queue, runs each task
//! through an injected [`Processor`], and delivers exactly one
//! [`TaskResult`] back on the task's private channel without ever blocking
//! on a slow or absent submitter.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod processor;
pub mod queue;
pub mod telemetry;

pub use config::{SchedulerConfig, ShutdownPolicy};
pub use engine::{Lifecycle, Scheduler, SchedulerStats};
pub use error::{Error, Result};
pub use model::{NewTask, Payload, Task, TaskContext, TaskHandle, TaskId, TaskRequest, TaskResult};
pub use processor::{Processor, ProcessorError, processor_fn};
