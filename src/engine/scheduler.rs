//! The scheduler: bounded admission in front of a fixed worker pool.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::model::{NewTask, Task, TaskHandle};
use crate::processor::Processor;
use crate::queue::WorkQueue;

use super::stats::{Counters, SchedulerStats};
use super::worker::Worker;

/// Lifecycle of a scheduler. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Created,
    Started,
    Stopped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Created => f.write_str("created"),
            Lifecycle::Started => f.write_str("started"),
            Lifecycle::Stopped => f.write_str("stopped"),
        }
    }
}

/// Accepts tasks without blocking and runs them on a fixed pool of workers.
///
/// Cloning yields another handle to the same scheduler, e.g. for a signal
/// handler that calls [`stop`](Self::stop).
pub struct Scheduler {
    config: SchedulerConfig,
    processor: Arc<dyn Processor>,
    queue: WorkQueue,
    shutdown: CancellationToken,
    workers: TaskTracker,
    lifecycle: Arc<Mutex<Lifecycle>>,
    /// Set once the queue has been closed and cleared after the join.
    cleared: Arc<OnceCell<()>>,
    counters: Arc<Counters>,
}

impl Clone for Scheduler {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            processor: Arc::clone(&self.processor),
            queue: self.queue.clone(),
            shutdown: self.shutdown.clone(),
            workers: self.workers.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
            cleared: Arc::clone(&self.cleared),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("queue_depth", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler. Zero workers becomes 4, zero capacity becomes
    /// twice the worker count. Performs no I/O and spawns nothing.
    pub fn new(
        worker_count: usize,
        queue_capacity: usize,
        processor: impl Processor + 'static,
    ) -> Self {
        Self::from_config(SchedulerConfig::new(worker_count, queue_capacity), processor)
    }

    pub fn from_config(config: SchedulerConfig, processor: impl Processor + 'static) -> Self {
        let config = config.normalized();
        Self {
            config,
            processor: Arc::new(processor),
            queue: WorkQueue::new(config.queue_capacity),
            shutdown: CancellationToken::new(),
            workers: TaskTracker::new(),
            lifecycle: Arc::new(Mutex::new(Lifecycle::Created)),
            cleared: Arc::new(OnceCell::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.config.workers
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Workers spawned and not yet exited.
    pub fn live_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn state(&self) -> Lifecycle {
        *self.lock_lifecycle()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot(self.queue.len(), self.workers.len())
    }

    /// Spawn the worker pool onto the current tokio runtime.
    ///
    /// Only the first call spawns; later calls, and calls after
    /// [`stop`](Self::stop), do nothing.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(&self) {
        let mut state = self.lock_lifecycle();
        match *state {
            Lifecycle::Created => {}
            Lifecycle::Started => {
                debug!("scheduler already started");
                return;
            }
            Lifecycle::Stopped => {
                warn!("start called on a stopped scheduler, ignoring");
                return;
            }
        }

        for id in 0..self.config.workers {
            let worker = Worker {
                id,
                queue: self.queue.clone(),
                processor: Arc::clone(&self.processor),
                shutdown: self.shutdown.clone(),
                policy: self.config.shutdown,
                counters: Arc::clone(&self.counters),
            };
            self.workers.spawn(worker.run());
        }
        *state = Lifecycle::Started;

        info!(
            workers = self.config.workers,
            queue_capacity = self.queue.capacity(),
            shutdown_policy = %self.config.shutdown,
            "scheduler started"
        );
    }

    /// Offer a task to the queue. Never waits.
    ///
    /// Fails with [`Error::QueueFull`] when there is no free slot and with
    /// [`Error::Stopped`] after [`stop`](Self::stop). A rejected task is
    /// dropped, closing its result channel.
    pub fn submit(&self, task: Task) -> Result<()> {
        if self.state() == Lifecycle::Stopped {
            return Err(Error::Stopped);
        }

        let task_id = task.id();
        match self.queue.push(task) {
            Ok(()) => {
                self.counters.record_submitted();
                debug!(%task_id, depth = self.queue.len(), "task queued");
                Ok(())
            }
            Err(e @ Error::QueueFull { .. }) => {
                self.counters.record_rejected();
                debug!(%task_id, "queue full, task rejected");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Build a task from `new`, submit it, and return the handle to await.
    pub fn submit_new(&self, new: NewTask) -> Result<TaskHandle> {
        let (task, handle) = new.into_task();
        self.submit(task)?;
        Ok(handle)
    }

    /// Signal workers to stop and wait for all of them to exit.
    ///
    /// In-flight tasks finish; what happens to queued tasks depends on the
    /// configured [`ShutdownPolicy`](crate::ShutdownPolicy). Safe to call
    /// more than once and before [`start`](Self::start); every call returns
    /// only after leftover queued tasks have been abandoned.
    pub async fn stop(&self) {
        let first = {
            let mut state = self.lock_lifecycle();
            let first = *state != Lifecycle::Stopped;
            *state = Lifecycle::Stopped;
            self.shutdown.cancel();
            first
        };

        if first {
            info!(live_workers = self.workers.len(), "scheduler stopping");
        }

        self.workers.close();
        self.workers.wait().await;

        self.cleared
            .get_or_init(|| async {
                let abandoned = self.queue.close_and_clear().await;
                if abandoned > 0 {
                    self.counters.record_abandoned(abandoned);
                    warn!(abandoned, "queued tasks abandoned at shutdown");
                }
                info!("scheduler stopped");
            })
            .await;
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
