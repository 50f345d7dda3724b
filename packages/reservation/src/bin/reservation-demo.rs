//! Sells out a block of seats with more requests than there is capacity.

use std::time::Duration;

use futures_util::future::join_all;
use reservation::{ReserveOutcome, ResourceId, ServiceConfig};
use tracing_subscriber::EnvFilter;

const RESOURCE: &str = "seats";
const CAPACITY: u32 = 50;
const REQUESTS: usize = 60;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::from_env()?;
    let service = reservation::init_service(&config).await?;

    let seats = ResourceId::new(RESOURCE)?;
    service.initialize(&seats, CAPACITY).await?;
    service
        .start_workers(config.reservation.worker_concurrency)
        .await?;

    let outcomes = join_all((0..REQUESTS).map(|_| service.reserve(&seats))).await;

    let mut blocked = 0;
    let mut rejected = 0;
    let mut accepted = Vec::new();
    for outcome in &outcomes {
        match outcome {
            ReserveOutcome::Accepted { job_id } => accepted.push(*job_id),
            ReserveOutcome::Blocked => blocked += 1,
            ReserveOutcome::Rejected { reason } => {
                tracing::warn!("Reservation rejected: {}", reason);
                rejected += 1;
            }
        }
    }

    let wait = Duration::from_secs(config.queue.default_timeout_secs.max(1));
    let mut reserved = 0;
    let mut failed = 0;
    for job_id in accepted {
        let job = service.queue().wait_for(job_id, wait).await?;
        match job.error() {
            None => reserved += 1,
            Some(reason) => {
                tracing::debug!("Job {} failed: {}", job_id, reason);
                failed += 1;
            }
        }
    }

    tracing::info!(
        "{} requests: {} reserved, {} failed, {} blocked, {} rejected; {} {} left ({:?})",
        REQUESTS,
        reserved,
        failed,
        blocked,
        rejected,
        service.available(&seats).await?,
        RESOURCE,
        service.gate_state(&seats).await
    );

    service.queue().shutdown().await?;
    Ok(())
}
