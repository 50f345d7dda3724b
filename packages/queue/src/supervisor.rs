//! Supervisor actor for managing all queues and workers.

use std::collections::HashMap;
use std::sync::Arc;

use db::repositories::JobRepository;
use queue_core::{JobEvent, Queue};
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;

use crate::config::{QueueSettings, WorkerPoolConfig};
use crate::error::QueueError;
use crate::handler::JobHandler;
use crate::messages::{QueueMessage, SupervisorMessage, WorkerMessage};
use crate::queue_actor::{QueueActor, QueueActorState};
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// Supervisor actor arguments.
pub struct SupervisorArgs {
    pub repo: JobRepository,
    pub event_tx: broadcast::Sender<JobEvent>,
    pub settings: QueueSettings,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    /// Queue actors by job type.
    pub queues: HashMap<String, ActorRef<QueueMessage>>,
    /// Worker actors with their worker IDs.
    workers: HashMap<ActorId, (String, ActorRef<WorkerMessage>)>,
    /// Job persistence shared with every queue.
    repo: JobRepository,
    /// Event broadcaster.
    pub event_tx: broadcast::Sender<JobEvent>,
    settings: QueueSettings,
    /// Worker counter for unique IDs.
    worker_counter: u64,
}

impl SupervisorState {
    fn new(args: SupervisorArgs) -> Self {
        Self {
            queues: HashMap::new(),
            workers: HashMap::new(),
            repo: args.repo,
            event_tx: args.event_tx,
            settings: args.settings,
            worker_counter: 0,
        }
    }

    /// Generate a unique worker ID.
    fn next_worker_id(&mut self, job_type: &str) -> String {
        self.worker_counter += 1;
        format!("{}-worker-{}", job_type, self.worker_counter)
    }
}

async fn queue_for(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
    job_type: &str,
) -> Result<ActorRef<QueueMessage>, ActorProcessingErr> {
    if let Some(queue) = state.queues.get(job_type) {
        return Ok(queue.clone());
    }

    let queue_state =
        QueueActorState::new(Queue::new(job_type), state.repo.clone(), state.event_tx.clone());

    let (actor, _handle) =
        Actor::spawn_linked(None, QueueActor, queue_state, myself.get_cell())
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn queue: {}", e)))?;

    state.queues.insert(job_type.to_string(), actor.clone());
    Ok(actor)
}

async fn attach_pool(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
    job_type: String,
    config: WorkerPoolConfig,
    handler: Arc<dyn JobHandler>,
) -> Result<(), QueueError> {
    config.validate()?;

    let queue = queue_for(myself, state, &job_type)
        .await
        .map_err(|e| QueueError::Actor(e.to_string()))?;

    let (tx, rx) = ractor::concurrency::oneshot();
    queue
        .send_message(QueueMessage::AttachPool {
            concurrency: config.concurrency,
            reply: tx.into(),
        })
        .map_err(|e| QueueError::Actor(e.to_string()))?;
    rx.await
        .map_err(|_| QueueError::Actor("Queue dropped pool request".into()))??;

    for _ in 0..config.concurrency {
        let worker_id = state.next_worker_id(&job_type);
        let args = WorkerArgs {
            worker_id: worker_id.clone(),
            job_type: job_type.clone(),
            queue: queue.clone(),
            handler: handler.clone(),
            event_tx: state.event_tx.clone(),
            poll_interval: state.settings.poll_interval(),
            rpc_timeout: state.settings.rpc_timeout(),
        };

        let (worker, _handle) =
            Actor::spawn_linked(None, WorkerActor, args, myself.get_cell()).await?;
        state
            .workers
            .insert(worker.get_id(), (worker_id, worker));
    }

    Ok(())
}

/// Supervisor actor that manages all queues.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting job queue supervisor");
        Ok(SupervisorState::new(args))
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::GetOrCreateQueue { job_type, reply } => {
                let queue = queue_for(&myself, state, &job_type)
                    .await
                    .map_err(|e| QueueError::Actor(e.to_string()));
                let _ = reply.send(queue);
            }

            SupervisorMessage::FindQueue { job_type, reply } => {
                let _ = reply.send(state.queues.get(&job_type).cloned());
            }

            SupervisorMessage::Process {
                job_type,
                config,
                handler,
                reply,
            } => {
                let result = attach_pool(&myself, state, job_type, config, handler).await;
                let _ = reply.send(result);
            }

            SupervisorMessage::GetJob { job_id, reply } => {
                for queue_ref in state.queues.values() {
                    let (tx, rx) = ractor::concurrency::oneshot();
                    if queue_ref
                        .send_message(QueueMessage::GetJob {
                            job_id,
                            reply: tx.into(),
                        })
                        .is_ok()
                        && let Ok(Some(job)) = rx.await
                    {
                        let _ = reply.send(Some(job));
                        return Ok(());
                    }
                }
                let _ = reply.send(None);
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down supervisor");
                for (_, worker) in state.workers.values() {
                    let _ = worker.send_message(WorkerMessage::Shutdown);
                }
                for queue_ref in state.queues.values() {
                    let _ = queue_ref.send_message(QueueMessage::Shutdown);
                }
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                if let Some((worker_id, _)) = state.workers.remove(&cell.get_id()) {
                    tracing::debug!("Worker {} terminated: {:?}", worker_id, reason);
                } else {
                    tracing::debug!("Child actor {} terminated: {:?}", cell.get_id(), reason);
                }
            }
            SupervisionEvent::ActorFailed(cell, err) => {
                if let Some((worker_id, _)) = state.workers.remove(&cell.get_id()) {
                    tracing::warn!("Worker {} failed: {}", worker_id, err);
                } else {
                    tracing::warn!("Child actor {} failed: {}", cell.get_id(), err);
                    state.queues.retain(|_, queue| queue.get_id() != cell.get_id());
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Start the supervisor.
pub async fn start_supervisor(
    args: SupervisorArgs,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    Actor::spawn(None, Supervisor, args).await
}
