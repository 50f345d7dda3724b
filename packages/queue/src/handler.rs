//! Job handler trait and the context handed to running jobs.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use queue_core::{Job, JobId, JobResult};
use ractor::ActorRef;

use crate::messages::QueueMessage;

/// Result type for job handlers. `Err` carries the failure reason.
pub type HandlerResult = Result<JobResult, String>;

/// Future type for async job handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Trait for job handlers.
///
/// Implement this trait to define how jobs of a specific type are processed.
/// The returned future runs on its own task, so a panic inside it fails the
/// job instead of the worker.
pub trait JobHandler: Send + Sync + 'static {
    /// Process a job and return the result.
    fn handle(&self, job: Job, ctx: JobContext) -> HandlerFuture;
}

impl fmt::Debug for dyn JobHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JobHandler")
    }
}

/// A simple function-based job handler.
pub struct FnHandler<F>
where
    F: Fn(Job, JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Job, JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    /// Create a new function-based handler.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(Job, JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    fn handle(&self, job: Job, ctx: JobContext) -> HandlerFuture {
        (self.handler)(job, ctx)
    }
}

const RUNNING: u8 = 0;
const COMMITTING: u8 = 1;
const EXPIRED: u8 = 2;

/// Race between a handler committing a side effect and its timeout firing.
/// Whichever moves first out of `RUNNING` wins.
#[derive(Clone, Default)]
pub(crate) struct Deadline(Arc<AtomicU8>);

impl Deadline {
    /// Handler side. `false` once the timeout has fired.
    fn enter_commit(&self) -> bool {
        match self
            .0
            .compare_exchange(RUNNING, COMMITTING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == COMMITTING,
        }
    }

    /// Worker side. `false` if the handler is committing and must be allowed to finish.
    pub(crate) fn expire(&self) -> bool {
        self.0
            .compare_exchange(RUNNING, EXPIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Handle given to a running job for reporting progress.
#[derive(Clone)]
pub struct JobContext {
    job_id: JobId,
    worker_id: String,
    queue: ActorRef<QueueMessage>,
    deadline: Deadline,
}

impl JobContext {
    pub(crate) fn new(
        job_id: JobId,
        worker_id: String,
        queue: ActorRef<QueueMessage>,
        deadline: Deadline,
    ) -> Self {
        Self {
            job_id,
            worker_id,
            queue,
            deadline,
        }
    }

    /// Declare that the handler is about to make a change that cannot be
    /// rolled back. From then on the job timeout no longer aborts the
    /// handler; the worker waits for its result instead.
    ///
    /// Returns `false` if the job has already timed out, in which case the
    /// change must not be made.
    pub fn enter_commit(&self) -> bool {
        self.deadline.enter_commit()
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Report progress (0-100). Lower values than already reported are ignored.
    pub fn progress(&self, progress: u8) {
        let message = QueueMessage::Progress {
            job_id: self.job_id,
            worker_id: self.worker_id.clone(),
            progress,
        };
        if let Err(e) = self.queue.send_message(message) {
            tracing::debug!("Dropped progress for job {}: {}", self.job_id, e);
        }
    }
}
