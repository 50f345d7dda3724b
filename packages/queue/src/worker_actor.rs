//! Worker actor for executing jobs.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use queue_core::{Job, JobEvent};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast;
use tokio::task::JoinError;

use crate::handler::{Deadline, HandlerResult, JobContext, JobHandler};
use crate::messages::{QueueMessage, WorkerMessage};

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID.
    pub worker_id: String,
    /// Job type this worker serves.
    pub job_type: String,
    /// Current job being processed.
    pub current_job: Option<Job>,
    /// Queue actor reference.
    pub queue: ActorRef<QueueMessage>,
    /// Handler for this job type.
    pub handler: Arc<dyn JobHandler>,
    /// Event broadcaster.
    pub event_tx: broadcast::Sender<JobEvent>,
    /// Set while a job runs so the poll ticker stays quiet.
    busy: Arc<AtomicBool>,
    /// How long to wait for the queue to answer a job request.
    rpc_timeout: Duration,
}

impl WorkerActorState {
    /// Check if the worker is idle.
    pub fn is_idle(&self) -> bool {
        self.current_job.is_none()
    }
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub job_type: String,
    pub queue: ActorRef<QueueMessage>,
    pub handler: Arc<dyn JobHandler>,
    pub event_tx: broadcast::Sender<JobEvent>,
    pub poll_interval: Duration,
    pub rpc_timeout: Duration,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn join_outcome(joined: Result<HandlerResult, JoinError>) -> HandlerResult {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(format!(
            "Handler panicked: {}",
            panic_message(e.into_panic())
        )),
        Err(e) => Err(format!("Handler task aborted: {}", e)),
    }
}

/// Run the handler on its own task so panics and timeouts turn into failures.
///
/// A handler that entered its commit step before the timeout fired is
/// awaited to completion instead of being aborted.
async fn run_handler(
    handler: Arc<dyn JobHandler>,
    job: Job,
    ctx: JobContext,
    deadline: Deadline,
) -> HandlerResult {
    let job_id = job.id;
    let timeout = Duration::from_secs(job.timeout_secs);
    let mut task = tokio::spawn(handler.handle(job, ctx));

    match tokio::time::timeout(timeout, &mut task).await {
        Ok(joined) => join_outcome(joined),
        Err(_) if deadline.expire() => {
            task.abort();
            Err("job timed out".into())
        }
        Err(_) => {
            tracing::debug!("Job {} passed its timeout while committing", job_id);
            join_outcome(task.await)
        }
    }
}

/// Worker actor that executes jobs.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker_id);

        let busy = Arc::new(AtomicBool::new(false));

        // Poll for work while idle
        let ticker = myself.clone();
        let ticker_busy = busy.clone();
        let poll_interval = args.poll_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            loop {
                interval.tick().await;
                if ticker_busy.load(Ordering::Acquire) {
                    continue;
                }
                if ticker.send_message(WorkerMessage::Poll).is_err() {
                    break;
                }
            }
        });

        let _ = args.event_tx.send(JobEvent::WorkerConnected {
            worker_id: args.worker_id.clone(),
            job_type: args.job_type.clone(),
            timestamp: Utc::now(),
        });

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            job_type: args.job_type,
            current_job: None,
            queue: args.queue,
            handler: args.handler,
            event_tx: args.event_tx,
            busy,
            rpc_timeout: args.rpc_timeout,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let _ = state.event_tx.send(JobEvent::WorkerDisconnected {
            worker_id: state.worker_id.clone(),
            job_type: state.job_type.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::ProcessJob { job } => {
                let job = *job;
                let job_id = job.id;
                state.current_job = Some(job.clone());
                state.busy.store(true, Ordering::Release);

                let deadline = Deadline::default();
                let ctx = JobContext::new(
                    job_id,
                    state.worker_id.clone(),
                    state.queue.clone(),
                    deadline.clone(),
                );
                let outcome = run_handler(state.handler.clone(), job, ctx, deadline).await;

                state.current_job = None;
                state.busy.store(false, Ordering::Release);

                match outcome {
                    Ok(result) => {
                        state.queue.send_message(QueueMessage::JobCompleted {
                            job_id,
                            worker_id: state.worker_id.clone(),
                            result,
                        })?;
                    }
                    Err(error) => {
                        state.queue.send_message(QueueMessage::JobFailed {
                            job_id,
                            worker_id: state.worker_id.clone(),
                            error,
                        })?;
                    }
                }

                // Pick up the next job without waiting for the ticker
                myself.send_message(WorkerMessage::Poll)?;
            }

            WorkerMessage::Poll => {
                if !state.is_idle() {
                    return Ok(());
                }

                let result = ractor::rpc::call(
                    &state.queue,
                    |reply| QueueMessage::RequestJob {
                        worker_id: state.worker_id.clone(),
                        reply,
                    },
                    Some(state.rpc_timeout),
                )
                .await;

                if let Ok(ractor::rpc::CallResult::Success(Some(job))) = result {
                    // Mark busy before the message lands so the ticker stops polling.
                    state.current_job = Some(job.clone());
                    state.busy.store(true, Ordering::Release);
                    myself.send_message(WorkerMessage::ProcessJob { job: Box::new(job) })?;
                }
            }

            WorkerMessage::Shutdown => {
                tracing::info!("Shutting down worker: {}", state.worker_id);
                myself.stop(None);
            }
        }

        Ok(())
    }
}
