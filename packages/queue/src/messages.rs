//! Message types for actor communication.

use std::sync::Arc;

use queue_core::{Job, JobId, JobResult, Queue};
use ractor::{ActorRef, RpcReplyPort};

use crate::config::WorkerPoolConfig;
use crate::error::QueueError;
use crate::handler::JobHandler;

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Persist a created job and put it in line.
    Enqueue {
        job: Box<Job>,
        reply: RpcReplyPort<Result<Job, QueueError>>,
    },

    /// Set the pool size; only one pool may attach.
    AttachPool {
        concurrency: u32,
        reply: RpcReplyPort<Result<(), QueueError>>,
    },

    /// Request the next job for a worker.
    RequestJob {
        worker_id: String,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// Report progress of an active job.
    Progress {
        job_id: JobId,
        worker_id: String,
        progress: u8,
    },

    /// Report job completion.
    JobCompleted {
        job_id: JobId,
        worker_id: String,
        result: JobResult,
    },

    /// Report job failure.
    JobFailed {
        job_id: JobId,
        worker_id: String,
        error: String,
    },

    /// Get a job by ID.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// List jobs in this queue, oldest first.
    ListJobs {
        state_filter: Option<String>,
        limit: usize,
        reply: RpcReplyPort<Vec<Job>>,
    },

    /// Get queue info.
    GetInfo { reply: RpcReplyPort<Queue> },

    /// Shutdown the queue.
    Shutdown,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run a claimed job.
    ProcessJob { job: Box<Job> },

    /// Ask the queue for work if idle.
    Poll,

    /// Shutdown the worker.
    Shutdown,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Get the queue actor for a job type, spawning it on first use.
    GetOrCreateQueue {
        job_type: String,
        reply: RpcReplyPort<Result<ActorRef<QueueMessage>, QueueError>>,
    },

    /// Get the queue actor for a job type if it exists.
    FindQueue {
        job_type: String,
        reply: RpcReplyPort<Option<ActorRef<QueueMessage>>>,
    },

    /// Attach a worker pool to a job type.
    Process {
        job_type: String,
        config: WorkerPoolConfig,
        handler: Arc<dyn JobHandler>,
        reply: RpcReplyPort<Result<(), QueueError>>,
    },

    /// Get a job from any queue.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// Stop all workers and queues, then the supervisor itself.
    Shutdown,
}
