//! Reservation job payload.

use std::fmt;

use queue_core::Job;
use serde::{Deserialize, Serialize};

use crate::ReservationError;

/// Identifier of a reservable resource. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Result<Self, ReservationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ReservationError::InvalidPayload(
                "resource_id must not be empty".into(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ResourceId {
    type Error = ReservationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload of a reservation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPayload {
    pub resource_id: ResourceId,
}

impl ReservationPayload {
    pub fn new(resource_id: ResourceId) -> Self {
        Self { resource_id }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({ "resource_id": self.resource_id.as_str() })
    }

    /// Decode the payload carried by a reservation job.
    pub fn from_job(job: &Job) -> Result<Self, ReservationError> {
        serde_json::from_value(job.payload.clone())
            .map_err(|e| ReservationError::InvalidPayload(e.to_string()))
    }
}
