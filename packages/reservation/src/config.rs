//! Reservation and startup configuration.

use std::str::FromStr;

use db::DbConfig;
use job_queue::QueueSettings;
use serde::{Deserialize, Serialize};

use crate::ReservationError;

/// Job type used for reservation jobs unless configured otherwise.
pub const DEFAULT_JOB_TYPE: &str = "reserve_resource";

/// Reservation processing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationConfig {
    /// Job type reservation jobs are queued under.
    pub job_type: String,
    /// How many read-check-adjust rounds a job gets before giving up on
    /// concurrent counter updates.
    pub max_adjust_attempts: u32,
    /// Worker pool size for reservation jobs.
    pub worker_concurrency: u32,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            job_type: DEFAULT_JOB_TYPE.to_string(),
            max_adjust_attempts: 5,
            worker_concurrency: 1,
        }
    }
}

impl ReservationConfig {
    pub fn with_max_adjust_attempts(mut self, attempts: u32) -> Self {
        self.max_adjust_attempts = attempts;
        self
    }

    pub fn with_worker_concurrency(mut self, concurrency: u32) -> Self {
        self.worker_concurrency = concurrency;
        self
    }
}

/// Everything needed to bring up a reservation service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db: DbConfig,
    pub queue: QueueSettings,
    pub reservation: ReservationConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::memory(),
            queue: QueueSettings::default(),
            reservation: ReservationConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// - `RESERVATION_DB_ENDPOINT`: SurrealDB endpoint (default `mem://`)
    /// - `RESERVATION_CONCURRENCY`: worker pool size
    /// - `RESERVATION_MAX_ATTEMPTS`: counter adjustment attempts per job
    /// - `RESERVATION_JOB_TIMEOUT_SECS`: per-job processing timeout
    pub fn from_env() -> Result<Self, ReservationError> {
        let mut config = Self::default();

        if let Some(endpoint) = read_env("RESERVATION_DB_ENDPOINT")? {
            config.db = DbConfig::endpoint(endpoint);
        }
        if let Some(concurrency) = parse_env::<u32>("RESERVATION_CONCURRENCY")? {
            if concurrency == 0 {
                return Err(ReservationError::InvalidConfig(
                    "RESERVATION_CONCURRENCY must be at least 1".into(),
                ));
            }
            config.reservation.worker_concurrency = concurrency;
        }
        if let Some(attempts) = parse_env::<u32>("RESERVATION_MAX_ATTEMPTS")? {
            if attempts == 0 {
                return Err(ReservationError::InvalidConfig(
                    "RESERVATION_MAX_ATTEMPTS must be at least 1".into(),
                ));
            }
            config.reservation.max_adjust_attempts = attempts;
        }
        if let Some(timeout) = parse_env::<u64>("RESERVATION_JOB_TIMEOUT_SECS")? {
            config.queue.default_timeout_secs = timeout;
        }

        Ok(config)
    }
}

fn read_env(var_name: &str) -> Result<Option<String>, ReservationError> {
    match std::env::var(var_name) {
        Ok(v) => {
            let trimmed = v.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ReservationError::InvalidConfig(format!(
            "failed reading {var_name}: {e}"
        ))),
    }
}

fn parse_env<T: FromStr>(var_name: &str) -> Result<Option<T>, ReservationError>
where
    T::Err: std::fmt::Display,
{
    let Some(v) = read_env(var_name)? else {
        return Ok(None);
    };
    v.parse().map(Some).map_err(|e| {
        ReservationError::InvalidConfig(format!("invalid value for {var_name}={v}: {e}"))
    })
}
