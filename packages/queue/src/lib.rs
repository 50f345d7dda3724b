//! Actor system for the job queue.
//!
//! This crate provides the Ractor-based actor system for managing
//! job queues, worker pools, and the supervisor.
//!
//! # Architecture
//!
//! - `Supervisor` - Top-level actor that owns every queue and worker
//! - `QueueActor` - Owns one job type's jobs, dispatch order and concurrency limit
//! - `WorkerActor` - Executes jobs from a queue
//! - `JobQueue` - Cloneable handle used by producers and observers
//!
//! # Usage
//!
//! ```ignore
//! use job_queue::{FnHandler, JobQueue, QueueSettings, WorkerPoolConfig};
//!
//! let queue = JobQueue::start(database, QueueSettings::default()).await?;
//! queue
//!     .process("email", WorkerPoolConfig::new(4), FnHandler::new(|job, ctx| {
//!         Box::pin(async move { Ok(JobResult::new()) })
//!     }))
//!     .await?;
//!
//! let job = queue.save(queue.create("email", json!({ "to": "a@b.c" }))).await?;
//! ```

mod client;
mod config;
mod error;
mod handler;
mod messages;
mod queue_actor;
mod supervisor;
mod worker_actor;

pub use client::JobQueue;
pub use config::{QueueSettings, WorkerPoolConfig};
pub use error::{QueueError, QueueResult};
pub use handler::{FnHandler, HandlerFuture, HandlerResult, JobContext, JobHandler};
pub use messages::{QueueMessage, SupervisorMessage, WorkerMessage};
pub use queue_actor::{QueueActor, QueueActorState};
pub use supervisor::{Supervisor, SupervisorArgs, start_supervisor};
pub use worker_actor::{WorkerActor, WorkerArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
