//! Remaining-capacity counters.
//!
//! A counter is mutated with a compare-and-adjust step: the adjustment only
//! lands if the stored value is still the one the caller looked at. Two
//! workers that read the same value cannot both decrement it; the loser gets
//! [`CounterError::Conflict`] and is expected to re-read.

use std::future::Future;

use serde::Deserialize;
use thiserror::Error;

use crate::{Database, DbError};

/// Counter store errors.
#[derive(Debug, Error)]
pub enum CounterError {
    #[error(
        "counter {key} changed concurrently (expected {expected}, found {})",
        describe_actual(.actual)
    )]
    Conflict {
        key: String,
        expected: i64,
        actual: Option<i64>,
    },
    #[error("counter {0} has not been initialized")]
    Missing(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

fn describe_actual(actual: &Option<i64>) -> String {
    actual.map_or_else(|| "unknown".to_string(), |value| value.to_string())
}

impl CounterError {
    /// Whether re-reading and trying again may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, CounterError::Conflict { .. })
    }
}

impl From<surrealdb::Error> for CounterError {
    fn from(err: surrealdb::Error) -> Self {
        CounterError::Db(DbError::from(err))
    }
}

/// Key-value store of integer counters.
pub trait CounterStore: Send + Sync + 'static {
    /// Current value, or `None` if the key was never set.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<i64>, CounterError>> + Send;

    /// Unconditionally overwrite the value.
    fn set(&self, key: &str, value: i64) -> impl Future<Output = Result<(), CounterError>> + Send;

    /// Add `delta` to the value and return the result, provided the stored
    /// value still equals `observed`.
    ///
    /// Fails with [`CounterError::Conflict`] without writing anything if the
    /// value moved, and with [`CounterError::Missing`] if the key is absent.
    fn atomic_adjust(
        &self,
        key: &str,
        delta: i64,
        observed: i64,
    ) -> impl Future<Output = Result<i64, CounterError>> + Send;

    /// Current value with an absent key read as zero.
    fn available(&self, key: &str) -> impl Future<Output = Result<i64, CounterError>> + Send {
        async move { Ok(self.get(key).await?.unwrap_or(0)) }
    }
}

#[derive(Debug, Deserialize)]
struct RemainingRow {
    remaining: i64,
}

/// [`CounterStore`] backed by the SurrealDB `counter` table.
#[derive(Clone)]
pub struct SurrealCounterStore {
    db: Database,
}

impl SurrealCounterStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// SurrealDB reports optimistic transaction clashes as retryable commit errors.
fn is_transaction_conflict(err: &surrealdb::Error) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("conflict") || message.contains("can be retried")
}

impl CounterStore for SurrealCounterStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, CounterError> {
        let mut response = self
            .db
            .query("SELECT remaining FROM type::thing('counter', $key)")
            .bind(("key", key.to_owned()))
            .await?;

        let rows: Vec<RemainingRow> = response.take(0)?;
        Ok(rows.into_iter().next().map(|row| row.remaining))
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), CounterError> {
        self.db
            .query(
                "UPSERT type::thing('counter', $key) \
                 SET remaining = $value, updated_at = time::now() RETURN NONE",
            )
            .bind(("key", key.to_owned()))
            .bind(("value", value))
            .await?
            .check()?;

        tracing::debug!("Counter {} set to {}", key, value);
        Ok(())
    }

    async fn atomic_adjust(
        &self,
        key: &str,
        delta: i64,
        observed: i64,
    ) -> Result<i64, CounterError> {
        let conflict = |actual| CounterError::Conflict {
            key: key.to_owned(),
            expected: observed,
            actual,
        };

        let result = self
            .db
            .query(
                "UPDATE type::thing('counter', $key) \
                 SET remaining = remaining + $delta, updated_at = time::now() \
                 WHERE remaining = $observed RETURN remaining",
            )
            .bind(("key", key.to_owned()))
            .bind(("delta", delta))
            .bind(("observed", observed))
            .await;

        let rows: Vec<RemainingRow> = match result.and_then(|mut response| response.take(0)) {
            Ok(rows) => rows,
            Err(err) if is_transaction_conflict(&err) => {
                tracing::debug!("Counter {} transaction conflict: {}", key, err);
                return Err(conflict(None));
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(row) = rows.into_iter().next() {
            return Ok(row.remaining);
        }

        // Nothing matched: either the record is gone or the value moved.
        match self.get(key).await? {
            None => Err(CounterError::Missing(key.to_owned())),
            Some(actual) => Err(conflict(Some(actual))),
        }
    }
}
