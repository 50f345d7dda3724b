//! Producer and observer facing handle to the actor system.

use std::sync::Arc;
use std::time::Duration;

use db::Database;
use db::repositories::JobRepository;
use queue_core::{Job, JobEvent, JobId, Queue};
use ractor::rpc::CallResult;
use ractor::{ActorRef, Message, RpcReplyPort};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use crate::config::{QueueSettings, WorkerPoolConfig};
use crate::error::{QueueError, QueueResult};
use crate::handler::JobHandler;
use crate::messages::{QueueMessage, SupervisorMessage};
use crate::supervisor::{SupervisorArgs, start_supervisor};

/// Handle to a running job queue.
///
/// Cloning is cheap; all clones talk to the same supervisor.
#[derive(Clone)]
pub struct JobQueue {
    supervisor: ActorRef<SupervisorMessage>,
    events: broadcast::Sender<JobEvent>,
    settings: QueueSettings,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

async fn call<M, T, F>(actor: &ActorRef<M>, build: F, timeout: Duration) -> QueueResult<T>
where
    M: Message,
    T: Send + 'static,
    F: FnOnce(RpcReplyPort<T>) -> M,
{
    match ractor::rpc::call(actor, build, Some(timeout)).await {
        Ok(CallResult::Success(value)) => Ok(value),
        Ok(CallResult::Timeout) => Err(QueueError::Timeout),
        Ok(CallResult::SenderError) => Err(QueueError::Actor("Actor dropped the reply".into())),
        Err(e) => Err(QueueError::Actor(e.to_string())),
    }
}

impl JobQueue {
    /// Start the supervisor. Jobs are persisted through `db`.
    pub async fn start(db: Database, settings: QueueSettings) -> QueueResult<Self> {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));

        let args = SupervisorArgs {
            repo: JobRepository::new(db),
            event_tx: events.clone(),
            settings: settings.clone(),
        };
        let (supervisor, handle) = start_supervisor(args).await?;

        Ok(Self {
            supervisor,
            events,
            settings,
            handle: Arc::new(Mutex::new(Some(handle))),
        })
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Build a job in the `Created` state. Nothing is queued until [`save`](Self::save).
    pub fn create(&self, job_type: impl Into<String>, payload: serde_json::Value) -> Job {
        Job::new(job_type, payload).with_timeout(self.settings.default_timeout_secs)
    }

    /// Persist a created job and make it eligible for dispatch.
    ///
    /// Fails only on backend or messaging faults, or if the job was already saved.
    pub async fn save(&self, job: Job) -> QueueResult<Job> {
        if job.job_type.is_empty() {
            return Err(QueueError::EmptyJobType);
        }

        let queue = self.queue_ref(&job.job_type).await?;
        call(
            &queue,
            |reply| QueueMessage::Enqueue {
                job: Box::new(job),
                reply,
            },
            self.settings.rpc_timeout(),
        )
        .await?
    }

    /// Attach a worker pool of `config.concurrency` workers running `handler`
    /// for every job of `job_type`.
    pub async fn process<H: JobHandler>(
        &self,
        job_type: impl Into<String>,
        config: WorkerPoolConfig,
        handler: H,
    ) -> QueueResult<()> {
        let job_type = job_type.into();
        if job_type.is_empty() {
            return Err(QueueError::EmptyJobType);
        }
        config.validate()?;

        call(
            &self.supervisor,
            |reply| SupervisorMessage::Process {
                job_type,
                config,
                handler: Arc::new(handler),
                reply,
            },
            self.settings.rpc_timeout(),
        )
        .await?
    }

    /// Receive lifecycle events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Look up a job in any queue.
    pub async fn get_job(&self, job_id: JobId) -> QueueResult<Option<Job>> {
        call(
            &self.supervisor,
            |reply| SupervisorMessage::GetJob { job_id, reply },
            self.settings.rpc_timeout(),
        )
        .await
    }

    /// List jobs of a type, oldest first, optionally filtered by state name.
    pub async fn list_jobs(
        &self,
        job_type: &str,
        state: Option<&str>,
        limit: usize,
    ) -> QueueResult<Vec<Job>> {
        let Some(queue) = self.find_queue(job_type).await? else {
            return Ok(Vec::new());
        };
        call(
            &queue,
            |reply| QueueMessage::ListJobs {
                state_filter: state.map(str::to_string),
                limit,
                reply,
            },
            self.settings.rpc_timeout(),
        )
        .await
    }

    /// Queue metadata and stats for a job type.
    pub async fn queue_info(&self, job_type: &str) -> QueueResult<Option<Queue>> {
        let Some(queue) = self.find_queue(job_type).await? else {
            return Ok(None);
        };
        let info = call(
            &queue,
            |reply| QueueMessage::GetInfo { reply },
            self.settings.rpc_timeout(),
        )
        .await?;
        Ok(Some(info))
    }

    /// Wait until a job reaches `complete` or `failed` and return it.
    pub async fn wait_for(&self, job_id: JobId, timeout: Duration) -> QueueResult<Job> {
        // Subscribe before checking so the terminal event cannot slip by.
        let mut events = self.subscribe();

        let wait = async {
            loop {
                let job = self
                    .get_job(job_id)
                    .await?
                    .ok_or(QueueError::NotFound(job_id))?;
                if job.status.is_terminal() {
                    return Ok(job);
                }

                loop {
                    match events.recv().await {
                        Ok(event) if event.is_terminal() && event.job_id() == Some(job_id) => break,
                        Ok(_) => continue,
                        // Missed events; re-check the job itself.
                        Err(RecvError::Lagged(_)) => break,
                        Err(RecvError::Closed) => {
                            return Err(QueueError::Actor("Event channel closed".into()));
                        }
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| QueueError::Timeout)?
    }

    /// Stop every worker and queue, then the supervisor.
    pub async fn shutdown(&self) -> QueueResult<()> {
        self.supervisor
            .send_message(SupervisorMessage::Shutdown)
            .map_err(|e| QueueError::Actor(e.to_string()))?;

        if let Some(handle) = self.handle.lock().await.take() {
            handle
                .await
                .map_err(|e| QueueError::Actor(format!("Supervisor task failed: {}", e)))?;
        }
        Ok(())
    }

    async fn queue_ref(&self, job_type: &str) -> QueueResult<ActorRef<QueueMessage>> {
        let job_type = job_type.to_string();
        call(
            &self.supervisor,
            |reply| SupervisorMessage::GetOrCreateQueue { job_type, reply },
            self.settings.rpc_timeout(),
        )
        .await?
    }

    async fn find_queue(&self, job_type: &str) -> QueueResult<Option<ActorRef<QueueMessage>>> {
        let job_type = job_type.to_string();
        call(
            &self.supervisor,
            |reply| SupervisorMessage::FindQueue { job_type, reply },
            self.settings.rpc_timeout(),
        )
        .await
    }
}
