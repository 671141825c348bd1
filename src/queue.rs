//! Bounded work queue with non-blocking admission.
//!
//! Many submitters push, many workers pull. The receiving half is shared
//! behind an async mutex: whichever worker holds the lock is the one parked
//! on the next task, the rest wait their turn on the lock.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::config::MAX_QUEUE_CAPACITY;
use crate::error::{Error, Result};
use crate::model::Task;

pub struct WorkQueue {
    tx: mpsc::Sender<Task>,
    rx: Arc<Mutex<mpsc::Receiver<Task>>>,
}

impl Clone for WorkQueue {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: Arc::clone(&self.rx),
        }
    }
}

impl WorkQueue {
    /// Create a queue holding at most `capacity` tasks, clamped to
    /// `1..=MAX_QUEUE_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.clamp(1, MAX_QUEUE_CAPACITY));
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Tasks currently buffered.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue without waiting.
    ///
    /// A full queue rejects with [`Error::QueueFull`]; a closed queue with
    /// [`Error::Stopped`]. Either way the task is dropped, which closes its
    /// result channel.
    pub fn push(&self, task: Task) -> Result<()> {
        match self.tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::QueueFull {
                capacity: self.capacity(),
            }),
            Err(TrySendError::Closed(_)) => Err(Error::Stopped),
        }
    }

    /// Wait for the next task. `None` once the queue is closed and empty.
    ///
    /// Cancel safe: dropping the future never loses a task.
    pub async fn pop(&self) -> Option<Task> {
        self.rx.lock().await.recv().await
    }

    /// Take the next task only if one is already buffered.
    pub async fn try_pop(&self) -> Option<Task> {
        self.rx.lock().await.try_recv().ok()
    }

    /// Refuse further pushes and drop everything still buffered.
    /// Returns how many tasks were dropped.
    pub async fn close_and_clear(&self) -> usize {
        let mut rx = self.rx.lock().await;
        rx.close();

        let mut dropped = 0;
        while let Ok(task) = rx.try_recv() {
            drop(task);
            dropped += 1;
        }
        dropped
    }
}
