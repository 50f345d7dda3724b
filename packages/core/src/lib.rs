//! Core domain types for the job queue system.
//!
//! This crate contains shared types used across all packages:
//! - Job and JobStatus for work items and their lifecycle
//! - Queue and QueueStats for per-type job containers
//! - Events for observing job lifecycles

mod events;
mod job;
mod queue;

pub use events::JobEvent;
pub use job::{DEFAULT_TIMEOUT_SECS, Job, JobId, JobResult, JobStatus, LifecycleError};
pub use queue::{Queue, QueueStats};
