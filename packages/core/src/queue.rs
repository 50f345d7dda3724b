//! Queue domain types. There is one queue per job type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics for a queue's current state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    /// Number of enqueued jobs waiting for a worker.
    pub pending: u64,
    /// Number of active jobs.
    pub running: u64,
    /// Number of completed jobs.
    pub completed: u64,
    /// Number of failed jobs.
    pub failed: u64,
    /// Average active duration of finished jobs in milliseconds.
    pub avg_duration_ms: Option<f64>,
}

impl QueueStats {
    /// Total jobs in queue (pending + running).
    pub fn active(&self) -> u64 {
        self.pending + self.running
    }

    /// Total processed jobs.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.processed();
        if total == 0 {
            None
        } else {
            Some((self.completed as f64 / total as f64) * 100.0)
        }
    }

    /// Fold a finished job's duration into the running average.
    pub fn record_duration(&mut self, duration_ms: u64) {
        let finished = self.processed();
        if finished == 0 {
            return;
        }
        let previous = self.avg_duration_ms.unwrap_or(0.0);
        let weight = (finished - 1) as f64;
        self.avg_duration_ms = Some((previous * weight + duration_ms as f64) / finished as f64);
    }
}

/// A queue holds the jobs of a single job type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    /// Job type served by this queue.
    pub job_type: String,
    /// Worker pool size, once a pool has been registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u32>,
    /// Current statistics.
    pub stats: QueueStats,
    /// When the queue was created.
    pub created_at: DateTime<Utc>,
}

impl Queue {
    /// Create a new queue for the given job type, with no worker pool yet.
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            concurrency: None,
            stats: QueueStats::default(),
            created_at: Utc::now(),
        }
    }

    /// Check if a worker pool is attached and jobs can be dispatched.
    pub fn is_processing(&self) -> bool {
        self.concurrency.is_some()
    }

    /// Check if another job may become active without exceeding the pool size.
    pub fn has_capacity(&self) -> bool {
        self.concurrency
            .is_some_and(|limit| self.stats.running < u64::from(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_requires_pool() {
        let mut queue = Queue::new("reserve");
        assert!(!queue.is_processing());
        assert!(!queue.has_capacity());

        queue.concurrency = Some(2);
        queue.stats.running = 1;
        assert!(queue.has_capacity());
        queue.stats.running = 2;
        assert!(!queue.has_capacity());
    }

    #[test]
    fn test_stats_average_duration() {
        let mut stats = QueueStats {
            completed: 1,
            ..Default::default()
        };
        stats.record_duration(100);
        assert_eq!(stats.avg_duration_ms, Some(100.0));

        stats.failed = 1;
        stats.record_duration(300);
        assert_eq!(stats.avg_duration_ms, Some(200.0));
        assert_eq!(stats.success_rate(), Some(50.0));
    }
}
