//! Scheduler engine: worker pool lifecycle, task execution, counters.

pub mod scheduler;
pub mod stats;
mod worker;

pub use scheduler::{Lifecycle, Scheduler};
pub use stats::SchedulerStats;
