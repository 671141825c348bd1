//! Typed configuration.
//!
//! Scheduler sizing comes from a TOML file, the environment, or code.
//! Zero or negative sizes fall back to defaults; the scheduler never runs
//! with zero workers or a zero-slot queue.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Worker count used when none (or a non-positive one) is configured.
pub const DEFAULT_WORKERS: usize = 4;

/// Largest queue a scheduler can hold. Bounded by tokio's channel permits.
pub const MAX_QUEUE_CAPACITY: usize = usize::MAX >> 3;

/// What happens to tasks still queued when the scheduler stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Workers stop pulling at once; queued tasks are dropped and their
    /// handles resolve to `Error::Abandoned`.
    #[default]
    Abandon,
    /// Workers empty the queue before exiting.
    Drain,
}

impl fmt::Display for ShutdownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownPolicy::Abandon => f.write_str("abandon"),
            ShutdownPolicy::Drain => f.write_str("drain"),
        }
    }
}

impl FromStr for ShutdownPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abandon" => Ok(ShutdownPolicy::Abandon),
            "drain" => Ok(ShutdownPolicy::Drain),
            other => Err(Error::Config(format!(
                "unknown shutdown policy '{other}' (expected 'abandon' or 'drain')"
            ))),
        }
    }
}

/// Sizing and shutdown behaviour of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub shutdown: ShutdownPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl SchedulerConfig {
    /// Build a config, applying the defaulting rules: zero workers becomes
    /// [`DEFAULT_WORKERS`], zero capacity becomes twice the worker count.
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers,
            queue_capacity,
            shutdown: ShutdownPolicy::default(),
        }
        .normalized()
    }

    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown = policy;
        self
    }

    /// Re-apply the defaulting rules. Capacity is capped at
    /// [`MAX_QUEUE_CAPACITY`].
    pub fn normalized(mut self) -> Self {
        if self.workers == 0 {
            self.workers = DEFAULT_WORKERS;
        }
        if self.queue_capacity == 0 {
            self.queue_capacity = self.workers.saturating_mul(2);
        }
        self.queue_capacity = self.queue_capacity.min(MAX_QUEUE_CAPACITY);
        self
    }

    /// Parse a `[scheduler]` table.
    ///
    /// ```toml
    /// [scheduler]
    /// workers = 8
    /// queue_capacity = 32
    /// shutdown = "drain"
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self> {
        SchedulerSection::parse(content)?.into_config()
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        SchedulerSection::read(path)?.into_config()
    }
}

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    scheduler: Option<SchedulerSection>,
}

/// Signed so that negative sizes reach the defaulting rules instead of
/// failing to parse.
#[derive(Debug, Default, Deserialize)]
struct SchedulerSection {
    workers: Option<i64>,
    queue_capacity: Option<i64>,
    #[serde(default)]
    shutdown: ShutdownPolicy,
}

impl SchedulerSection {
    fn parse(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.scheduler.unwrap_or_default())
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    fn into_config(self) -> Result<SchedulerConfig> {
        let workers = size("workers", self.workers)?;
        let queue_capacity = size("queue_capacity", self.queue_capacity)?;
        Ok(SchedulerConfig::new(workers, queue_capacity).shutdown_policy(self.shutdown))
    }
}

/// Non-positive or missing sizes map to zero so the defaults apply.
fn size(field: &str, value: Option<i64>) -> Result<usize> {
    let Some(n) = value.filter(|n| *n > 0) else {
        return Ok(0);
    };
    usize::try_from(n)
        .ok()
        .filter(|n| *n <= MAX_QUEUE_CAPACITY)
        .ok_or_else(|| {
            Error::Config(format!(
                "{field} = {n} is out of range (at most {MAX_QUEUE_CAPACITY})"
            ))
        })
}

/// Process configuration loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `TASKPOOL_CONFIG` optionally names a TOML file used as the base;
    /// `TASKPOOL_WORKERS`, `TASKPOOL_QUEUE_CAPACITY` and
    /// `TASKPOOL_SHUTDOWN_POLICY` override individual fields.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Like [`from_env`](Self::from_env), but `file` (when given) replaces
    /// `TASKPOOL_CONFIG` as the base TOML file.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut section = match (file, std::env::var("TASKPOOL_CONFIG")) {
            (Some(path), _) => SchedulerSection::read(path)?,
            (None, Ok(path)) => SchedulerSection::read(Path::new(&path))?,
            (None, Err(_)) => SchedulerSection::default(),
        };

        if let Some(workers) = optional_int("TASKPOOL_WORKERS")? {
            section.workers = Some(workers);
        }
        if let Some(capacity) = optional_int("TASKPOOL_QUEUE_CAPACITY")? {
            section.queue_capacity = Some(capacity);
        }
        if let Ok(policy) = std::env::var("TASKPOOL_SHUTDOWN_POLICY") {
            section.shutdown = policy.parse()?;
        }

        Ok(Self {
            scheduler: section.into_config()?,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn optional_int(name: &str) -> Result<Option<i64>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<i64>().map(Some).map_err(|_| {
            Error::Config(format!("environment variable {name} must be an integer, got '{raw}'"))
        }),
        Err(_) => Ok(None),
    }
}
