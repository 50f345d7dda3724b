//! Per-resource admission gate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::ResourceId;

/// Whether new reservation requests are admitted for a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    Accepting,
    Blocked,
}

/// Admission gate for every resource, shared by producers and workers.
///
/// Producers only read it, so a request may slip past a gate that is about to
/// close; that job then fails during processing.
///
/// Every `open` starts a new generation. A worker closes the gate for the
/// generation it observed before reading the counter, so a close decided on a
/// counter that has since been re-provisioned is dropped.
#[derive(Debug, Default)]
pub struct ReservationGate {
    entries: RwLock<HashMap<ResourceId, GateEntry>>,
}

#[derive(Debug, Clone, Copy, Default)]
struct GateEntry {
    state: GateState,
    generation: u64,
}

impl ReservationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state. Resources never seen are accepting.
    pub async fn state(&self, resource_id: &ResourceId) -> GateState {
        self.entry(resource_id).await.state
    }

    pub async fn is_blocked(&self, resource_id: &ResourceId) -> bool {
        self.state(resource_id).await == GateState::Blocked
    }

    /// Provisioning generation, bumped by every `open`.
    pub async fn generation(&self, resource_id: &ResourceId) -> u64 {
        self.entry(resource_id).await.generation
    }

    /// Admit requests again and start a new generation, which is returned.
    pub async fn open(&self, resource_id: &ResourceId) -> u64 {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(resource_id.clone()).or_default();
        entry.state = GateState::Accepting;
        entry.generation += 1;
        entry.generation
    }

    /// Stop admitting requests, unless the gate was reopened after
    /// `generation` was read. Returns `true` if this call closed it.
    pub async fn close(&self, resource_id: &ResourceId, generation: u64) -> bool {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(resource_id.clone()).or_default();
        if entry.generation != generation {
            tracing::debug!(
                "Ignoring stale close of {} (generation {}, now {})",
                resource_id,
                generation,
                entry.generation
            );
            return false;
        }
        if entry.state == GateState::Blocked {
            return false;
        }
        entry.state = GateState::Blocked;
        tracing::info!("Reservations for {} are now blocked", resource_id);
        true
    }

    async fn entry(&self, resource_id: &ResourceId) -> GateEntry {
        self.entries
            .read()
            .await
            .get(resource_id)
            .copied()
            .unwrap_or_default()
    }
}
