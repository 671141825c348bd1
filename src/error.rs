//! Error types for taskpool.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Admission rejected: the bounded queue has no free slot.
    #[error("queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("scheduler stopped")]
    Stopped,

    /// The result channel closed without a result, e.g. the task was still
    /// queued when the scheduler shut down.
    #[error("task abandoned before a result was delivered")]
    Abandoned,

    #[error("task context cancelled before a result was delivered")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
