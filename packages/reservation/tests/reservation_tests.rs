#![allow(clippy::disallowed_methods)]

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use queue_core::{Job, JobStatus};

use db::{CounterError, CounterStore, DbConfig, SurrealCounterStore};
use job_queue::{JobQueue, QueueSettings};
use reservation::{
    GateState, Provisioned, ReservationConfig, ReservationReceipt, ReservationService,
    ReserveOutcome, ResourceId,
};

const WAIT: Duration = Duration::from_secs(10);

/// Counter store that reports a conflict for the first `conflicts` adjustments.
struct ContendedStore {
    inner: SurrealCounterStore,
    conflicts: AtomicU32,
}

impl CounterStore for ContendedStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, CounterError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), CounterError> {
        self.inner.set(key, value).await
    }

    async fn atomic_adjust(&self, key: &str, delta: i64, observed: i64) -> Result<i64, CounterError> {
        let injected = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(CounterError::Conflict {
                key: key.to_string(),
                expected: observed,
                actual: None,
            });
        }
        self.inner.atomic_adjust(key, delta, observed).await
    }
}

/// Counter store whose adjustments land at once but take `delay` to be acknowledged.
struct SlowAckStore {
    inner: SurrealCounterStore,
    delay: Duration,
}

impl CounterStore for SlowAckStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, CounterError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), CounterError> {
        self.inner.set(key, value).await
    }

    async fn atomic_adjust(&self, key: &str, delta: i64, observed: i64) -> Result<i64, CounterError> {
        let remaining = self.inner.atomic_adjust(key, delta, observed).await?;
        tokio::time::sleep(self.delay).await;
        Ok(remaining)
    }
}

fn fast_polling() -> QueueSettings {
    QueueSettings::default().with_poll_interval(Duration::from_millis(10))
}

async fn start_queue(settings: QueueSettings) -> Result<(db::Database, JobQueue), Box<dyn Error>> {
    let database = db::init(DbConfig::memory()).await?;
    let queue = JobQueue::start(database.clone(), settings).await?;
    Ok((database, queue))
}

async fn start_service(
    config: ReservationConfig,
) -> Result<Arc<ReservationService<SurrealCounterStore>>, Box<dyn Error>> {
    let (database, queue) = start_queue(fast_polling()).await?;
    let store = SurrealCounterStore::new(database);
    Ok(Arc::new(ReservationService::new(store, queue, config)))
}

async fn start_contended(
    conflicts: u32,
    config: ReservationConfig,
) -> Result<Arc<ReservationService<ContendedStore>>, Box<dyn Error>> {
    let (database, queue) = start_queue(fast_polling()).await?;
    let store = ContendedStore {
        inner: SurrealCounterStore::new(database),
        conflicts: AtomicU32::new(conflicts),
    };
    Ok(Arc::new(ReservationService::new(store, queue, config)))
}

async fn settle<S: CounterStore>(
    service: &ReservationService<S>,
    outcomes: &[ReserveOutcome],
) -> Result<Vec<Job>, Box<dyn Error>> {
    let mut jobs = Vec::new();
    for outcome in outcomes {
        let job_id = outcome.job_id().ok_or("expected an accepted reservation")?;
        jobs.push(service.queue().wait_for(job_id, WAIT).await?);
    }
    Ok(jobs)
}

fn count_complete(jobs: &[Job]) -> usize {
    jobs.iter()
        .filter(|j| matches!(j.status, JobStatus::Complete { .. }))
        .count()
}

#[tokio::test]
async fn test_hall_sells_out() -> Result<(), Box<dyn Error>> {
    let service = start_service(ReservationConfig::default()).await?;
    let hall = ResourceId::new("hall")?;

    assert_eq!(service.initialize(&hall, 2).await?, Provisioned::Fresh);
    service.start_workers(1).await?;

    let outcomes = join_all((0..3).map(|_| service.reserve(&hall))).await;
    assert!(outcomes.iter().all(|o| o.status() == "in process"));

    let jobs = settle(&service, &outcomes).await?;
    assert_eq!(count_complete(&jobs), 2);

    let failures: Vec<&str> = jobs.iter().filter_map(Job::error).collect();
    assert_eq!(failures, vec!["not enough capacity available"]);

    assert_eq!(service.available(&hall).await?, 0);
    assert_eq!(service.gate_state(&hall).await, GateState::Blocked);

    service.queue().shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_empty_item_blocks_after_first_request() -> Result<(), Box<dyn Error>> {
    let service = start_service(ReservationConfig::default()).await?;
    let item = ResourceId::new("item-7")?;

    service.initialize(&item, 0).await?;
    service.start_workers(1).await?;

    let first = service.reserve(&item).await;
    assert!(matches!(first, ReserveOutcome::Accepted { .. }));
    let jobs = settle(&service, std::slice::from_ref(&first)).await?;
    // The counter exists at 0; "no capacity" is only for an absent counter.
    assert_eq!(jobs[0].error(), Some("not enough capacity available"));

    assert_eq!(service.gate_state(&item).await, GateState::Blocked);
    let second = service.reserve(&item).await;
    assert_eq!(second, ReserveOutcome::Blocked);
    assert_eq!(second.status(), "blocked");

    service.queue().shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_concurrent_workers_never_oversell() -> Result<(), Box<dyn Error>> {
    // Generous retry budget so real contention never exhausts it.
    let service =
        start_service(ReservationConfig::default().with_max_adjust_attempts(100)).await?;
    let seats = ResourceId::new("seats")?;
    let capacity = 10;

    service.initialize(&seats, capacity).await?;
    service.start_workers(4).await?;

    let outcomes = join_all((0..30).map(|_| service.reserve(&seats))).await;
    let accepted: Vec<ReserveOutcome> = outcomes
        .into_iter()
        .filter(|o| matches!(o, ReserveOutcome::Accepted { .. }))
        .collect();
    let jobs = settle(&service, &accepted).await?;

    let completed = count_complete(&jobs);
    let remaining = service.available(&seats).await?;
    assert_eq!(completed, capacity as usize);
    assert_eq!(remaining, 0);
    assert_eq!(remaining, i64::from(capacity) - completed as i64);

    // Each completed job took a distinct unit.
    let mut left: Vec<i64> = jobs
        .iter()
        .filter_map(|j| match &j.status {
            JobStatus::Complete { result, .. } => result.output.clone(),
            _ => None,
        })
        .map(serde_json::from_value::<ReservationReceipt>)
        .map(|r| r.map(|r| r.remaining))
        .collect::<Result<_, _>>()?;
    left.sort_unstable();
    assert_eq!(left, (0..i64::from(capacity)).collect::<Vec<_>>());

    assert!(
        jobs.iter()
            .filter_map(Job::error)
            .all(|e| e == "not enough capacity available")
    );
    assert_eq!(service.gate_state(&seats).await, GateState::Blocked);

    service.queue().shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_blocked_reserve_creates_no_job() -> Result<(), Box<dyn Error>> {
    let service = start_service(ReservationConfig::default()).await?;
    let hall = ResourceId::new("hall")?;
    let job_type = service.config().job_type.clone();

    service.initialize(&hall, 1).await?;
    service.start_workers(1).await?;

    let outcome = service.reserve(&hall).await;
    settle(&service, std::slice::from_ref(&outcome)).await?;
    assert_eq!(service.gate_state(&hall).await, GateState::Blocked);

    let before = service.queue().list_jobs(&job_type, None, 100).await?.len();
    for _ in 0..3 {
        assert_eq!(service.reserve(&hall).await, ReserveOutcome::Blocked);
    }
    let after = service.queue().list_jobs(&job_type, None, 100).await?.len();
    assert_eq!(before, after);

    service.queue().shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_initialize_resets_and_reopens() -> Result<(), Box<dyn Error>> {
    let service = start_service(ReservationConfig::default()).await?;
    let hall = ResourceId::new("hall")?;

    service.initialize(&hall, 1).await?;
    service.start_workers(1).await?;

    let first = service.reserve(&hall).await;
    settle(&service, std::slice::from_ref(&first)).await?;
    assert_eq!(service.gate_state(&hall).await, GateState::Blocked);

    let provisioned = service.initialize(&hall, 3).await?;
    assert_eq!(
        provisioned,
        Provisioned::Reset {
            previous_remaining: 0
        }
    );
    assert_eq!(service.available(&hall).await?, 3);
    assert_eq!(service.gate_state(&hall).await, GateState::Accepting);

    let again = service.reserve(&hall).await;
    let jobs = settle(&service, std::slice::from_ref(&again)).await?;
    assert_eq!(count_complete(&jobs), 1);
    assert_eq!(service.available(&hall).await?, 2);

    service.queue().shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_unprovisioned_resource_fails_with_no_capacity() -> Result<(), Box<dyn Error>> {
    let service = start_service(ReservationConfig::default()).await?;
    let ghost = ResourceId::new("ghost")?;
    service.start_workers(1).await?;

    assert_eq!(service.available(&ghost).await?, 0);

    let outcome = service.reserve(&ghost).await;
    let jobs = settle(&service, std::slice::from_ref(&outcome)).await?;
    assert_eq!(jobs[0].error(), Some("no capacity"));
    assert_eq!(service.gate_state(&ghost).await, GateState::Blocked);

    service.queue().shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_invalid_payload_fails_job() -> Result<(), Box<dyn Error>> {
    let service = start_service(ReservationConfig::default()).await?;
    service.start_workers(1).await?;

    let job_type = service.config().job_type.clone();
    let queue = service.queue();
    let job = queue
        .save(queue.create(job_type, serde_json::json!({ "seat": 4 })))
        .await?;
    let job = queue.wait_for(job.id, WAIT).await?;

    let reason = job.error().ok_or("expected failure")?;
    assert!(reason.starts_with("invalid reservation payload"), "{}", reason);

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_conflicts_are_retried() -> Result<(), Box<dyn Error>> {
    let service = start_contended(2, ReservationConfig::default()).await?;
    let hall = ResourceId::new("hall")?;

    service.initialize(&hall, 5).await?;
    service.start_workers(1).await?;

    let outcome = service.reserve(&hall).await;
    let jobs = settle(&service, std::slice::from_ref(&outcome)).await?;

    let receipt = match &jobs[0].status {
        JobStatus::Complete { result, .. } => {
            serde_json::from_value::<ReservationReceipt>(result.output.clone().ok_or("no output")?)?
        }
        other => return Err(format!("expected complete, got {:?}", other).into()),
    };
    assert_eq!(receipt.attempts, 3);
    assert_eq!(receipt.remaining, 4);
    assert_eq!(service.available(&hall).await?, 4);

    service.queue().shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_fail_without_spending() -> Result<(), Box<dyn Error>> {
    let service =
        start_contended(10, ReservationConfig::default().with_max_adjust_attempts(3)).await?;
    let hall = ResourceId::new("hall")?;

    service.initialize(&hall, 5).await?;
    service.start_workers(1).await?;

    let outcome = service.reserve(&hall).await;
    let jobs = settle(&service, std::slice::from_ref(&outcome)).await?;
    assert_eq!(jobs[0].error(), Some("capacity adjustment conflicted 3 times"));

    assert_eq!(service.available(&hall).await?, 5);
    assert_eq!(service.gate_state(&hall).await, GateState::Accepting);

    service.queue().shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_adjust_acknowledged_after_timeout_still_completes() -> Result<(), Box<dyn Error>> {
    let (database, queue) = start_queue(fast_polling().with_default_timeout(1)).await?;
    let store = SlowAckStore {
        inner: SurrealCounterStore::new(database),
        delay: Duration::from_millis(1500),
    };
    let service = Arc::new(ReservationService::new(
        store,
        queue,
        ReservationConfig::default(),
    ));
    let hall = ResourceId::new("hall")?;
    let capacity = 2;

    service.initialize(&hall, capacity).await?;
    service.start_workers(1).await?;

    let outcome = service.reserve(&hall).await;
    let jobs = settle(&service, std::slice::from_ref(&outcome)).await?;

    // The unit was spent, so the job must report it.
    let completed = count_complete(&jobs);
    assert_eq!(completed, 1, "{:?}", jobs[0].error());
    let remaining = service.available(&hall).await?;
    assert_eq!(remaining, 1);
    assert_eq!(remaining, i64::from(capacity) - completed as i64);

    service.queue().shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_save_is_rejected_without_a_job() -> Result<(), Box<dyn Error>> {
    let config = ReservationConfig {
        job_type: String::new(),
        ..ReservationConfig::default()
    };
    let service = start_service(config).await?;
    let hall = ResourceId::new("hall")?;
    service.initialize(&hall, 2).await?;

    let outcome = service.reserve(&hall).await;
    match &outcome {
        ReserveOutcome::Rejected { reason } => assert_eq!(reason, "Job type must not be empty"),
        other => return Err(format!("expected rejection, got {:?}", other).into()),
    }
    assert_eq!(outcome.status(), "failed");
    assert_eq!(outcome.job_id(), None);

    let queue = service.queue();
    assert!(queue.list_jobs("", None, 100).await?.is_empty());
    assert!(queue.queue_info("").await?.is_none());

    // Rejection leaves capacity and the gate alone.
    assert_eq!(service.available(&hall).await?, 2);
    assert_eq!(service.gate_state(&hall).await, GateState::Accepting);

    queue.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_reserve_after_queue_shutdown_is_rejected() -> Result<(), Box<dyn Error>> {
    let service = start_service(ReservationConfig::default()).await?;
    let hall = ResourceId::new("hall")?;
    service.initialize(&hall, 2).await?;

    service.queue().shutdown().await?;

    let outcome = service.reserve(&hall).await;
    assert!(
        matches!(outcome, ReserveOutcome::Rejected { .. }),
        "{:?}",
        outcome
    );
    assert_eq!(outcome.status(), "failed");
    assert_eq!(service.available(&hall).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_outcomes_serialize_for_callers() -> Result<(), Box<dyn Error>> {
    let blocked = serde_json::to_value(ReserveOutcome::Blocked)?;
    assert_eq!(blocked, serde_json::json!({ "outcome": "blocked" }));

    let rejected = ReserveOutcome::Rejected {
        reason: "queue down".into(),
    };
    assert_eq!(rejected.status(), "failed");
    assert_eq!(serde_json::to_value(&rejected)?["reason"], "queue down");
    Ok(())
}
