//! The execution capability injected into the scheduler.
//!
//! The scheduler never looks inside a processor. It calls
//! [`Processor::process`] once per task, possibly from several workers at
//! the same time, and forwards whatever comes back.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::model::{TaskContext, TaskRequest};

/// Runs one task. Must tolerate concurrent invocation.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, ctx: &TaskContext, request: &TaskRequest) -> anyhow::Result<String>;
}

#[async_trait]
impl<P: Processor + ?Sized> Processor for Arc<P> {
    async fn process(&self, ctx: &TaskContext, request: &TaskRequest) -> anyhow::Result<String> {
        (**self).process(ctx, request).await
    }
}

/// Adapter turning an async closure into a [`Processor`].
pub struct FnProcessor<F> {
    f: F,
}

impl<F> fmt::Debug for FnProcessor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProcessor").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Processor for FnProcessor<F>
where
    F: Fn(TaskContext, TaskRequest) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    async fn process(&self, ctx: &TaskContext, request: &TaskRequest) -> anyhow::Result<String> {
        (self.f)(ctx.clone(), request.clone()).await
    }
}

/// Build a processor from a closure.
///
/// ```
/// let processor = taskpool::processor_fn(|_ctx, req| async move {
///     Ok::<_, anyhow::Error>(format!("{}_done", req.input))
/// });
/// # let _ = processor;
/// ```
pub fn processor_fn<F, Fut>(f: F) -> FnProcessor<F>
where
    F: Fn(TaskContext, TaskRequest) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    FnProcessor { f }
}

/// A processor failure as carried in a `TaskResult`.
///
/// Cloneable wrapper that displays exactly as the processor's own error.
#[derive(Clone)]
pub struct ProcessorError(Arc<anyhow::Error>);

impl ProcessorError {
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for ProcessorError {
    fn from(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }
}

impl fmt::Debug for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for ProcessorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}
