//! Reservation producer and worker logic.

use std::sync::Arc;

use db::{CounterError, CounterStore};
use job_queue::{HandlerFuture, HandlerResult, JobContext, JobHandler, JobQueue, WorkerPoolConfig};
use queue_core::{Job, JobId, JobResult};
use serde::{Deserialize, Serialize};

use crate::{
    GateState, ReservationConfig, ReservationError, ReservationGate, ReservationPayload, ResourceId,
};

/// What happened to a reservation request at admission time.
///
/// `Accepted` means a job was queued, not that a unit was reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReserveOutcome {
    Accepted { job_id: JobId },
    Blocked,
    Rejected { reason: String },
}

impl ReserveOutcome {
    /// Status string reported to requesters.
    pub fn status(&self) -> &'static str {
        match self {
            ReserveOutcome::Accepted { .. } => "in process",
            ReserveOutcome::Blocked => "blocked",
            ReserveOutcome::Rejected { .. } => "failed",
        }
    }

    pub fn job_id(&self) -> Option<JobId> {
        match self {
            ReserveOutcome::Accepted { job_id } => Some(*job_id),
            _ => None,
        }
    }
}

/// Result of provisioning a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provisioned", rename_all = "snake_case")]
pub enum Provisioned {
    Fresh,
    /// The resource already had a counter, which was overwritten.
    Reset { previous_remaining: i64 },
}

/// Output recorded on a completed reservation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationReceipt {
    pub resource_id: ResourceId,
    /// Capacity left after this reservation.
    pub remaining: i64,
    /// Read-check-adjust rounds it took.
    pub attempts: u32,
}

/// Turns reservation requests into jobs and processes them against the
/// capacity counters.
pub struct ReservationService<S: CounterStore> {
    store: S,
    queue: JobQueue,
    gate: ReservationGate,
    config: ReservationConfig,
}

impl<S: CounterStore> ReservationService<S> {
    pub fn new(store: S, queue: JobQueue, config: ReservationConfig) -> Self {
        Self {
            store,
            queue,
            gate: ReservationGate::new(),
            config,
        }
    }

    pub fn config(&self) -> &ReservationConfig {
        &self.config
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Set the remaining capacity of a resource and open its gate.
    ///
    /// On a resource that already has a counter this is a reset: earlier
    /// reservations are forgotten.
    pub async fn initialize(
        &self,
        resource_id: &ResourceId,
        capacity: u32,
    ) -> Result<Provisioned, ReservationError> {
        let key = resource_id.as_str();
        let previous = self.store.get(key).await?;
        self.store.set(key, i64::from(capacity)).await?;
        self.gate.open(resource_id).await;

        match previous {
            None => {
                tracing::info!("Provisioned {} with capacity {}", resource_id, capacity);
                Ok(Provisioned::Fresh)
            }
            Some(previous_remaining) => {
                tracing::warn!(
                    "Re-provisioned {} with capacity {} (had {} remaining)",
                    resource_id,
                    capacity,
                    previous_remaining
                );
                Ok(Provisioned::Reset { previous_remaining })
            }
        }
    }

    /// Admit a reservation request for asynchronous processing.
    pub async fn reserve(&self, resource_id: &ResourceId) -> ReserveOutcome {
        if self.gate.is_blocked(resource_id).await {
            tracing::debug!("Reservation for {} blocked", resource_id);
            return ReserveOutcome::Blocked;
        }

        let payload = ReservationPayload::new(resource_id.clone()).to_value();
        let job = self.queue.create(self.config.job_type.as_str(), payload);

        match self.queue.save(job).await {
            Ok(job) => ReserveOutcome::Accepted { job_id: job.id },
            Err(e) => {
                tracing::warn!("Failed to queue reservation for {}: {}", resource_id, e);
                ReserveOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Remaining capacity, with an unprovisioned resource reading as zero.
    pub async fn available(&self, resource_id: &ResourceId) -> Result<i64, ReservationError> {
        Ok(self.store.available(resource_id.as_str()).await?)
    }

    pub async fn gate_state(&self, resource_id: &ResourceId) -> GateState {
        self.gate.state(resource_id).await
    }

    /// Worker body for one reservation job.
    pub async fn process_reservation(&self, job: Job, ctx: JobContext) -> HandlerResult {
        ctx.progress(0);

        let payload = ReservationPayload::from_job(&job).map_err(|e| e.to_string())?;
        let receipt = self
            .take_unit(&payload.resource_id, &ctx)
            .await
            .map_err(|e| e.to_string())?;

        ctx.progress(100);
        tracing::debug!(
            "Reserved {} for job {}, {} left",
            receipt.resource_id,
            job.id,
            receipt.remaining
        );

        let output = serde_json::to_value(&receipt).map_err(|e| e.to_string())?;
        Ok(JobResult::with_output("reserved", output))
    }

    async fn take_unit(
        &self,
        resource_id: &ResourceId,
        ctx: &JobContext,
    ) -> Result<ReservationReceipt, ReservationError> {
        let key = resource_id.as_str();
        let max_attempts = self.config.max_adjust_attempts.max(1);

        for attempt in 1..=max_attempts {
            let generation = self.gate.generation(resource_id).await;
            let Some(observed) = self.store.get(key).await? else {
                self.gate.close(resource_id, generation).await;
                return Err(ReservationError::NoCapacity);
            };
            if observed <= 0 {
                self.gate.close(resource_id, generation).await;
                return Err(ReservationError::NotEnoughCapacity);
            }
            if attempt == 1 {
                ctx.progress(50);
                // Once the decrement is issued the job must not be cut off,
                // or a spent unit would be reported as a failure.
                if !ctx.enter_commit() {
                    return Err(ReservationError::TimedOut);
                }
            }

            match self.store.atomic_adjust(key, -1, observed).await {
                Ok(remaining) => {
                    if remaining <= 0 {
                        self.gate.close(resource_id, generation).await;
                    }
                    return Ok(ReservationReceipt {
                        resource_id: resource_id.clone(),
                        remaining,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!("Attempt {} for {}: {}", attempt, resource_id, e);
                }
                Err(CounterError::Missing(_)) => {
                    self.gate.close(resource_id, generation).await;
                    return Err(ReservationError::NoCapacity);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(
            "Giving up on {} after {} conflicting adjustments",
            resource_id,
            max_attempts
        );
        Err(ReservationError::RetriesExhausted(max_attempts))
    }

    /// Attach a pool of `concurrency` workers running
    /// [`process_reservation`](Self::process_reservation).
    pub async fn start_workers(self: &Arc<Self>, concurrency: u32) -> Result<(), ReservationError> {
        let handler = ReservationHandler {
            service: Arc::clone(self),
        };
        self.queue
            .process(
                self.config.job_type.clone(),
                WorkerPoolConfig::new(concurrency),
                handler,
            )
            .await?;
        tracing::info!(
            "Started {} reservation workers for {}",
            concurrency,
            self.config.job_type
        );
        Ok(())
    }
}

struct ReservationHandler<S: CounterStore> {
    service: Arc<ReservationService<S>>,
}

impl<S: CounterStore> JobHandler for ReservationHandler<S> {
    fn handle(&self, job: Job, ctx: JobContext) -> HandlerFuture {
        let service = Arc::clone(&self.service);
        Box::pin(async move { service.process_reservation(job, ctx).await })
    }
}
