//! Asynchronous reservation of finite resources.
//!
//! Requests are admitted through a per-resource gate and queued as jobs;
//! a bounded worker pool takes units from a capacity counter with a
//! compare-and-adjust loop, so concurrent workers cannot oversell.
//!
//! ```ignore
//! let service = reservation::init_service(&ServiceConfig::from_env()?).await?;
//! let seats = ResourceId::new("seats")?;
//! service.initialize(&seats, 50).await?;
//! service.start_workers(4).await?;
//!
//! match service.reserve(&seats).await {
//!     ReserveOutcome::Accepted { job_id } => { /* wait on the job */ }
//!     ReserveOutcome::Blocked => { /* sold out */ }
//!     ReserveOutcome::Rejected { reason } => { /* queue fault */ }
//! }
//! ```

mod config;
mod error;
mod gate;
mod payload;
mod service;

use std::sync::Arc;

pub use config::{DEFAULT_JOB_TYPE, ReservationConfig, ServiceConfig};
pub use error::ReservationError;
pub use gate::{GateState, ReservationGate};
pub use payload::{ReservationPayload, ResourceId};
pub use service::{Provisioned, ReservationReceipt, ReservationService, ReserveOutcome};

use db::SurrealCounterStore;
use job_queue::JobQueue;

/// Connect the database, start the job queue and build a service on top.
///
/// Workers are not started; call [`ReservationService::start_workers`].
pub async fn init_service(
    config: &ServiceConfig,
) -> Result<Arc<ReservationService<SurrealCounterStore>>, ReservationError> {
    tracing::info!("Initializing reservation service...");

    let database = db::init(config.db.clone()).await?;
    let queue = JobQueue::start(database.clone(), config.queue.clone()).await?;
    let store = SurrealCounterStore::new(database);

    tracing::info!("Reservation service initialized");
    Ok(Arc::new(ReservationService::new(
        store,
        queue,
        config.reservation.clone(),
    )))
}
