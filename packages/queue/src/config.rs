//! Queue and worker pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Settings shared by every queue in a [`JobQueue`](crate::JobQueue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Processing timeout applied to jobs built with `JobQueue::create` (seconds).
    pub default_timeout_secs: u64,
    /// How often an idle worker asks its queue for work (milliseconds).
    pub poll_interval_ms: u64,
    /// How long callers wait for an actor to answer (milliseconds).
    pub rpc_timeout_ms: u64,
    /// Buffer size of the lifecycle event channel.
    pub event_capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: queue_core::DEFAULT_TIMEOUT_SECS,
            poll_interval_ms: 100,
            rpc_timeout_ms: 5_000,
            event_capacity: 1024,
        }
    }
}

impl QueueSettings {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_default_timeout(mut self, timeout_secs: u64) -> Self {
        self.default_timeout_secs = timeout_secs;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// Worker pool for one job type. Concurrency has no default and must be
/// chosen per job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Maximum number of jobs of this type active at once.
    pub concurrency: u32,
}

impl WorkerPoolConfig {
    pub fn new(concurrency: u32) -> Self {
        Self { concurrency }
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if self.concurrency == 0 {
            return Err(QueueError::InvalidConcurrency(self.concurrency));
        }
        Ok(())
    }
}
