//! Job domain types and the job lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// Default processing timeout for a job, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current state of a job in its lifecycle.
///
/// Jobs move strictly forward: `Created -> Enqueued -> Active -> {Complete | Failed}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Built by a producer, not yet visible to workers.
    #[default]
    Created,
    /// Persisted and waiting for a worker.
    Enqueued { enqueued_at: DateTime<Utc> },
    /// Claimed by a worker.
    Active {
        started_at: DateTime<Utc>,
        worker_id: String,
        /// Last reported progress, 0-100.
        progress: u8,
    },
    /// Worker reported success.
    Complete {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        result: JobResult,
    },
    /// Worker reported an error, panicked, or timed out.
    Failed {
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        error: String,
    },
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete { .. } | JobStatus::Failed { .. })
    }

    /// Get a simple status string for display and filtering.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Enqueued { .. } => "enqueued",
            JobStatus::Active { .. } => "active",
            JobStatus::Complete { .. } => "complete",
            JobStatus::Failed { .. } => "failed",
        }
    }
}

/// Result of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Human-readable summary of the result.
    pub summary: String,
    /// Optional structured output data as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl JobResult {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            output: None,
        }
    }

    pub fn with_output(summary: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            summary: summary.into(),
            output: Some(output),
        }
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: &'static str,
        to: &'static str,
    },
}

/// A job represents a unit of deferred work executed by a worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Type of job, which also names the queue it runs on.
    pub job_type: String,
    /// Job payload as JSON.
    pub payload: serde_json::Value,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Processing timeout in seconds once the job is active.
    pub timeout_secs: u64,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job in the `Created` state.
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            payload,
            status: JobStatus::Created,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the timeout for this job.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn invalid(&self, to: &'static str) -> LifecycleError {
        LifecycleError::InvalidTransition {
            job_id: self.id,
            from: self.status.as_str(),
            to,
        }
    }

    /// `Created -> Enqueued`.
    pub fn enqueue(&mut self) -> Result<(), LifecycleError> {
        if self.status != JobStatus::Created {
            return Err(self.invalid("enqueued"));
        }
        let now = Utc::now();
        self.status = JobStatus::Enqueued { enqueued_at: now };
        self.updated_at = now;
        Ok(())
    }

    /// `Enqueued -> Active`, claimed by `worker_id`.
    pub fn activate(&mut self, worker_id: impl Into<String>) -> Result<(), LifecycleError> {
        if !matches!(self.status, JobStatus::Enqueued { .. }) {
            return Err(self.invalid("active"));
        }
        let now = Utc::now();
        self.status = JobStatus::Active {
            started_at: now,
            worker_id: worker_id.into(),
            progress: 0,
        };
        self.updated_at = now;
        Ok(())
    }

    /// Undo a claim that could not be recorded, putting the job back in line.
    pub fn release(&mut self) -> Result<(), LifecycleError> {
        if !matches!(self.status, JobStatus::Active { .. }) {
            return Err(self.invalid("enqueued"));
        }
        let now = Utc::now();
        self.status = JobStatus::Enqueued { enqueued_at: now };
        self.updated_at = now;
        Ok(())
    }

    /// Record progress for an active job.
    ///
    /// Values above 100 are clamped. Returns `Ok(false)` when `progress` is
    /// below what was already reported, leaving the job untouched.
    pub fn record_progress(&mut self, progress: u8) -> Result<bool, LifecycleError> {
        if !matches!(self.status, JobStatus::Active { .. }) {
            return Err(self.invalid("active"));
        }
        let progress = progress.min(100);
        if let JobStatus::Active {
            progress: current, ..
        } = &mut self.status
        {
            if progress < *current {
                return Ok(false);
            }
            *current = progress;
        }
        self.updated_at = Utc::now();
        Ok(true)
    }

    /// Time the job was claimed, if it has been.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match &self.status {
            JobStatus::Active { started_at, .. }
            | JobStatus::Complete { started_at, .. }
            | JobStatus::Failed { started_at, .. } => Some(*started_at),
            _ => None,
        }
    }

    /// Last reported progress of an active job.
    pub fn progress(&self) -> Option<u8> {
        match &self.status {
            JobStatus::Active { progress, .. } => Some(*progress),
            JobStatus::Complete { .. } => Some(100),
            _ => None,
        }
    }

    /// `Active -> Complete`.
    pub fn complete(&mut self, result: JobResult) -> Result<(), LifecycleError> {
        let Some(started_at) = self.active_since() else {
            return Err(self.invalid("complete"));
        };
        let now = Utc::now();
        self.status = JobStatus::Complete {
            started_at,
            completed_at: now,
            result,
        };
        self.updated_at = now;
        Ok(())
    }

    /// `Active -> Failed`.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), LifecycleError> {
        let Some(started_at) = self.active_since() else {
            return Err(self.invalid("failed"));
        };
        let now = Utc::now();
        self.status = JobStatus::Failed {
            started_at,
            failed_at: now,
            error: error.into(),
        };
        self.updated_at = now;
        Ok(())
    }

    fn active_since(&self) -> Option<DateTime<Utc>> {
        match &self.status {
            JobStatus::Active { started_at, .. } => Some(*started_at),
            _ => None,
        }
    }

    /// Failure reason of a failed job.
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            JobStatus::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn active_job() -> Job {
        let mut job = Job::new("reserve", json!({ "resource_id": "hall" }));
        job.enqueue().unwrap();
        job.activate("worker-1").unwrap();
        job
    }

    #[test]
    fn test_lifecycle_forward_path() {
        let mut job = Job::new("reserve", json!({}));
        assert_eq!(job.status.as_str(), "created");
        assert_eq!(job.timeout_secs, DEFAULT_TIMEOUT_SECS);

        job.enqueue().unwrap();
        assert_eq!(job.status.as_str(), "enqueued");

        job.activate("worker-1").unwrap();
        assert_eq!(job.progress(), Some(0));

        job.complete(JobResult::new("done")).unwrap();
        assert!(job.status.is_terminal());
        assert_eq!(job.progress(), Some(100));
        assert!(job.started_at().is_some());
    }

    #[test]
    fn test_rejects_skipping_states() {
        let mut job = Job::new("reserve", json!({}));
        let err = job.activate("worker-1").unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                job_id: job.id,
                from: "created",
                to: "active",
            }
        );

        job.enqueue().unwrap();
        assert!(job.enqueue().is_err());
        assert!(job.complete(JobResult::new("nope")).is_err());
        assert!(job.fail("nope").is_err());
    }

    #[test]
    fn test_terminal_jobs_are_frozen() {
        let mut job = active_job();
        job.fail("boom").unwrap();
        assert_eq!(job.error(), Some("boom"));

        assert!(job.complete(JobResult::new("late")).is_err());
        assert!(job.fail("again").is_err());
        assert!(job.record_progress(10).is_err());
        assert_eq!(job.error(), Some("boom"));
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut job = active_job();
        assert!(job.record_progress(40).unwrap());
        assert!(!job.record_progress(20).unwrap());
        assert_eq!(job.progress(), Some(40));
        assert!(job.record_progress(40).unwrap());
        assert!(job.record_progress(250).unwrap());
        assert_eq!(job.progress(), Some(100));
    }

    #[test]
    fn test_release_resets_progress() {
        let mut job = active_job();
        job.record_progress(60).unwrap();
        job.release().unwrap();
        assert_eq!(job.status.as_str(), "enqueued");

        job.activate("worker-2").unwrap();
        assert_eq!(job.progress(), Some(0));
    }

    #[test]
    fn test_status_serializes_with_state_tag() {
        let job = active_job();
        let value = serde_json::to_value(&job.status).unwrap();
        assert_eq!(value["state"], "active");
        assert_eq!(value["worker_id"], "worker-1");

        let back: JobStatus = serde_json::from_value(value).unwrap();
        assert_eq!(back, job.status);
    }
}
