//! Queue actor owning the jobs of a single job type.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use db::repositories::JobRepository;
use queue_core::{Job, JobEvent, JobId, JobStatus, Queue};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast;

use crate::error::QueueError;
use crate::messages::QueueMessage;

/// State for the queue actor.
pub struct QueueActorState {
    /// Queue metadata.
    pub queue: Queue,
    /// Enqueued jobs in arrival order.
    pending: VecDeque<JobId>,
    /// Active job IDs.
    running: HashSet<JobId>,
    /// All jobs by ID, including finished ones.
    jobs: HashMap<JobId, Job>,
    /// Job persistence.
    repo: JobRepository,
    /// Event broadcaster.
    event_tx: broadcast::Sender<JobEvent>,
}

impl QueueActorState {
    /// Create a new queue actor state.
    pub fn new(queue: Queue, repo: JobRepository, event_tx: broadcast::Sender<JobEvent>) -> Self {
        Self {
            queue,
            pending: VecDeque::new(),
            running: HashSet::new(),
            jobs: HashMap::new(),
            repo,
            event_tx,
        }
    }

    /// Log and broadcast an event.
    fn broadcast(&self, event: JobEvent) {
        match &event {
            JobEvent::JobProgress { .. } | JobEvent::JobStarted { .. } => {
                tracing::debug!("{}", event.description())
            }
            JobEvent::JobFailed { .. } => tracing::warn!("{}", event.description()),
            _ => tracing::info!("{}", event.description()),
        }
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    fn update_stats(&mut self) {
        self.queue.stats.pending = self.pending.len() as u64;
        self.queue.stats.running = self.running.len() as u64;
    }

    /// Take an active job out of the running set for its terminal transition.
    fn finish(&mut self, job_id: JobId, worker_id: &str) -> Option<Job> {
        let job = self.jobs.get(&job_id)?;
        match &job.status {
            JobStatus::Active { worker_id: owner, .. } if owner == worker_id => {}
            _ => {
                tracing::warn!(
                    "Ignoring result for job {} from {}: not its active job",
                    job_id,
                    worker_id
                );
                return None;
            }
        }
        self.running.remove(&job_id);
        self.jobs.get(&job_id).cloned()
    }

    async fn persist_status(&self, job: &Job) {
        if let Err(e) = self.repo.update_status(job.id, &job.status).await {
            tracing::warn!("Failed to update job {} status: {}", job.id, e);
        }
    }
}

fn duration_ms(job: &Job) -> u64 {
    match (&job.status, job.started_at()) {
        (JobStatus::Complete { completed_at, .. }, Some(started_at)) => {
            (*completed_at - started_at).num_milliseconds().max(0) as u64
        }
        (JobStatus::Failed { failed_at, .. }, Some(started_at)) => {
            (*failed_at - started_at).num_milliseconds().max(0) as u64
        }
        _ => 0,
    }
}

/// Queue actor that manages a single job type.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueActorState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting queue actor: {}", args.queue.job_type);
        Ok(args)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Enqueue { job, reply } => {
                let mut job = *job;
                if let Err(e) = job.enqueue() {
                    let _ = reply.send(Err(e.into()));
                    return Ok(());
                }

                if let Err(e) = state.repo.create(&job).await {
                    let _ = reply.send(Err(QueueError::Backend(e)));
                    return Ok(());
                }

                state.jobs.insert(job.id, job.clone());
                state.pending.push_back(job.id);
                state.update_stats();

                state.broadcast(JobEvent::JobEnqueued {
                    job: job.clone(),
                    timestamp: Utc::now(),
                });

                let _ = reply.send(Ok(job));
            }

            QueueMessage::AttachPool { concurrency, reply } => {
                if state.queue.is_processing() {
                    let _ = reply.send(Err(QueueError::AlreadyProcessing(
                        state.queue.job_type.clone(),
                    )));
                    return Ok(());
                }
                state.queue.concurrency = Some(concurrency);
                tracing::info!(
                    "Queue {} processing with concurrency {}",
                    state.queue.job_type,
                    concurrency
                );
                let _ = reply.send(Ok(()));
            }

            QueueMessage::RequestJob { worker_id, reply } => {
                // Concurrency limit
                if !state.queue.has_capacity() {
                    let _ = reply.send(None);
                    return Ok(());
                }

                let Some(job_id) = state.pending.pop_front() else {
                    let _ = reply.send(None);
                    return Ok(());
                };
                let Some(mut job) = state.jobs.get(&job_id).cloned() else {
                    tracing::warn!("Pending job {} has no record", job_id);
                    state.update_stats();
                    let _ = reply.send(None);
                    return Ok(());
                };

                if let Err(e) = job.activate(worker_id.as_str()) {
                    tracing::warn!("Cannot dispatch job {}: {}", job_id, e);
                    state.update_stats();
                    let _ = reply.send(None);
                    return Ok(());
                }

                if let Err(e) = state.repo.update_status(job.id, &job.status).await {
                    tracing::warn!("Failed to mark job {} active: {}", job.id, e);
                    // Back to the head of the line; the claim never happened.
                    if job.release().is_ok() {
                        state.jobs.insert(job.id, job);
                    }
                    state.pending.push_front(job_id);
                    state.update_stats();
                    let _ = reply.send(None);
                    return Ok(());
                }

                state.jobs.insert(job.id, job.clone());
                state.running.insert(job.id);
                state.update_stats();

                if reply.send(Some(job.clone())).is_err() {
                    // Worker stopped waiting; nobody will run this claim.
                    tracing::warn!("Worker {} went away, re-queueing job {}", worker_id, job_id);
                    state.running.remove(&job_id);
                    if job.release().is_ok() {
                        state.persist_status(&job).await;
                        state.jobs.insert(job_id, job);
                    }
                    state.pending.push_front(job_id);
                    state.update_stats();
                    return Ok(());
                }

                state.broadcast(JobEvent::JobStarted {
                    job_id: job.id,
                    job_type: job.job_type.clone(),
                    worker_id,
                    timestamp: Utc::now(),
                });
            }

            QueueMessage::Progress {
                job_id,
                worker_id,
                progress,
            } => {
                if !state.running.contains(&job_id) {
                    tracing::debug!("Ignoring progress for inactive job {}", job_id);
                    return Ok(());
                }
                let Some(mut job) = state.jobs.get(&job_id).cloned() else {
                    return Ok(());
                };
                if !matches!(&job.status, JobStatus::Active { worker_id: owner, .. } if *owner == worker_id)
                {
                    return Ok(());
                }

                match job.record_progress(progress) {
                    Ok(true) => {
                        let progress = job.progress().unwrap_or(progress);
                        state.jobs.insert(job_id, job);
                        state.broadcast(JobEvent::JobProgress {
                            job_id,
                            job_type: state.queue.job_type.clone(),
                            progress,
                            timestamp: Utc::now(),
                        });
                    }
                    Ok(false) => {
                        tracing::debug!("Ignoring stale progress {} for job {}", progress, job_id);
                    }
                    Err(e) => tracing::debug!("Ignoring progress: {}", e),
                }
            }

            QueueMessage::JobCompleted {
                job_id,
                worker_id,
                result,
            } => {
                if let Some(mut job) = state.finish(job_id, &worker_id) {
                    if let Err(e) = job.complete(result) {
                        tracing::warn!("Cannot complete job {}: {}", job_id, e);
                        return Ok(());
                    }
                    state.persist_status(&job).await;

                    let duration_ms = duration_ms(&job);
                    state.jobs.insert(job_id, job);
                    state.queue.stats.completed += 1;
                    state.queue.stats.record_duration(duration_ms);
                    state.update_stats();

                    state.broadcast(JobEvent::JobCompleted {
                        job_id,
                        job_type: state.queue.job_type.clone(),
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                }
            }

            QueueMessage::JobFailed {
                job_id,
                worker_id,
                error,
            } => {
                if let Some(mut job) = state.finish(job_id, &worker_id) {
                    if let Err(e) = job.fail(error.clone()) {
                        tracing::warn!("Cannot fail job {}: {}", job_id, e);
                        return Ok(());
                    }
                    state.persist_status(&job).await;

                    let duration_ms = duration_ms(&job);
                    state.jobs.insert(job_id, job);
                    state.queue.stats.failed += 1;
                    state.queue.stats.record_duration(duration_ms);
                    state.update_stats();

                    state.broadcast(JobEvent::JobFailed {
                        job_id,
                        job_type: state.queue.job_type.clone(),
                        error,
                        timestamp: Utc::now(),
                    });
                }
            }

            QueueMessage::GetJob { job_id, reply } => {
                let _ = reply.send(state.jobs.get(&job_id).cloned());
            }

            QueueMessage::ListJobs {
                state_filter,
                limit,
                reply,
            } => {
                let mut jobs: Vec<Job> = state
                    .jobs
                    .values()
                    .filter(|j| {
                        state_filter
                            .as_ref()
                            .is_none_or(|s| j.status.as_str() == s)
                    })
                    .cloned()
                    .collect();
                jobs.sort_by_key(|j| (j.created_at, j.id.0));
                jobs.truncate(limit);
                let _ = reply.send(jobs);
            }

            QueueMessage::GetInfo { reply } => {
                let _ = reply.send(state.queue.clone());
            }

            QueueMessage::Shutdown => {
                tracing::info!("Shutting down queue: {}", state.queue.job_type);
                myself.stop(None);
                return Ok(());
            }
        }

        Ok(())
    }
}
