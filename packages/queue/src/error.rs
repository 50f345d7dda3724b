//! Error type for queue operations.

use db::DbError;
use queue_core::{JobId, LifecycleError};
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Error type for queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue backend error: {0}")]
    Backend(#[from] DbError),

    #[error("Actor error: {0}")]
    Actor(String),

    #[error("Timed out waiting for the queue")]
    Timeout,

    #[error("Worker pool concurrency must be at least 1, got {0}")]
    InvalidConcurrency(u32),

    #[error("Job type '{0}' already has a worker pool")]
    AlreadyProcessing(String),

    #[error("Job type must not be empty")]
    EmptyJobType,

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl From<ractor::SpawnErr> for QueueError {
    fn from(err: ractor::SpawnErr) -> Self {
        QueueError::Actor(format!("Failed to spawn actor: {}", err))
    }
}
