//! Reservation errors.

use db::{CounterError, DbError};
use job_queue::QueueError;
use thiserror::Error;

/// Errors raised while provisioning or processing reservations.
///
/// The `Display` text of the first four variants is what a failed
/// reservation job records as its reason.
#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("no capacity")]
    NoCapacity,

    #[error("not enough capacity available")]
    NotEnoughCapacity,

    #[error("invalid reservation payload: {0}")]
    InvalidPayload(String),

    #[error("capacity adjustment conflicted {0} times")]
    RetriesExhausted(u32),

    #[error("job timed out")]
    TimedOut,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] CounterError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
