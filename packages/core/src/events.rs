//! Lifecycle events for observing jobs and workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// Events emitted by the job queue system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    // Job events
    /// A job was persisted and is waiting for a worker.
    JobEnqueued { job: Job, timestamp: DateTime<Utc> },
    /// A worker claimed a job.
    JobStarted {
        job_id: JobId,
        job_type: String,
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// An active job reported progress.
    JobProgress {
        job_id: JobId,
        job_type: String,
        progress: u8,
        timestamp: DateTime<Utc>,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: JobId,
        job_type: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job failed.
    JobFailed {
        job_id: JobId,
        job_type: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    // Worker events
    /// A worker joined a job type's pool.
    WorkerConnected {
        worker_id: String,
        job_type: String,
        timestamp: DateTime<Utc>,
    },
    /// A worker left a job type's pool.
    WorkerDisconnected {
        worker_id: String,
        job_type: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobEnqueued { timestamp, .. }
            | JobEvent::JobStarted { timestamp, .. }
            | JobEvent::JobProgress { timestamp, .. }
            | JobEvent::JobCompleted { timestamp, .. }
            | JobEvent::JobFailed { timestamp, .. }
            | JobEvent::WorkerConnected { timestamp, .. }
            | JobEvent::WorkerDisconnected { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job type associated with this event.
    pub fn job_type(&self) -> &str {
        match self {
            JobEvent::JobEnqueued { job, .. } => &job.job_type,
            JobEvent::JobStarted { job_type, .. }
            | JobEvent::JobProgress { job_type, .. }
            | JobEvent::JobCompleted { job_type, .. }
            | JobEvent::JobFailed { job_type, .. }
            | JobEvent::WorkerConnected { job_type, .. }
            | JobEvent::WorkerDisconnected { job_type, .. } => job_type,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobEnqueued { job, .. } => Some(job.id),
            JobEvent::JobStarted { job_id, .. }
            | JobEvent::JobProgress { job_id, .. }
            | JobEvent::JobCompleted { job_id, .. }
            | JobEvent::JobFailed { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Whether this event marks the end of a job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::JobCompleted { .. } | JobEvent::JobFailed { .. }
        )
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobEnqueued { job, .. } => {
                format!("Job {} ({}) enqueued", job.id, job.job_type)
            }
            JobEvent::JobStarted {
                job_id, worker_id, ..
            } => format!("Job {} started by {}", job_id, worker_id),
            JobEvent::JobProgress {
                job_id, progress, ..
            } => format!("Job {} {}% complete", job_id, progress),
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            JobEvent::JobFailed { job_id, error, .. } => {
                format!("Job {} failed: {}", job_id, error)
            }
            JobEvent::WorkerConnected {
                worker_id,
                job_type,
                ..
            } => format!("Worker {} connected to {}", worker_id, job_type),
            JobEvent::WorkerDisconnected {
                worker_id,
                job_type,
                ..
            } => format!("Worker {} disconnected from {}", worker_id, job_type),
        }
    }
}
