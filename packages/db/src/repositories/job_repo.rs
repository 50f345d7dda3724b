//! Job repository for lifecycle persistence.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use queue_core::{Job, JobId, JobStatus};
use serde::{Deserialize, Serialize};

use crate::{Database, DbError};

/// Repository for job persistence operations.
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
}

/// Stored form of a job. The record id is the job id; `job_id` repeats it
/// as a plain string so rows can be read back without parsing record ids.
#[derive(Debug, Serialize, Deserialize)]
struct JobRow {
    job_id: String,
    job_type: String,
    payload: serde_json::Value,
    status: JobStatus,
    timeout_secs: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            status: job.status.clone(),
            timeout_secs: job.timeout_secs,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

impl TryFrom<JobRow> for Job {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let id = JobId::parse(&row.job_id)
            .map_err(|e| DbError::Serialization(format!("bad job id {}: {}", row.job_id, e)))?;
        Ok(Job {
            id,
            job_type: row.job_type,
            payload: row.payload,
            status: row.status,
            timeout_secs: row.timeout_secs,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Filter options for listing jobs.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub job_type: Option<String>,
    /// Lifecycle state name, as returned by [`JobStatus::as_str`].
    pub state: Option<String>,
    pub limit: Option<usize>,
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new job in the database.
    pub async fn create(&self, job: &Job) -> Result<Job, DbError> {
        let record: Option<JobRow> = self
            .db
            .create(("job", job.id.to_string()))
            .content(JobRow::from(job))
            .await?;

        record
            .ok_or_else(|| DbError::Query(format!("Failed to create job {}", job.id)))
            .and_then(Job::try_from)
    }

    /// Get a job by ID.
    pub async fn get(&self, id: JobId) -> Result<Job, DbError> {
        let record: Option<JobRow> = self.db.select(("job", id.to_string())).await?;

        record
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))
            .and_then(Job::try_from)
    }

    /// List jobs in creation order with optional filtering.
    pub async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, DbError> {
        let mut conditions = Vec::new();
        let mut bindings: Vec<(&'static str, String)> = Vec::new();

        if let Some(job_type) = filter.job_type {
            conditions.push("job_type = $job_type");
            bindings.push(("job_type", job_type));
        }

        if let Some(state) = filter.state {
            conditions.push("status.state = $state");
            bindings.push(("state", state));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit_clause = filter
            .limit
            .map(|l| format!("LIMIT {}", l))
            .unwrap_or_default();

        let query = format!(
            "SELECT * FROM job {} ORDER BY created_at ASC {}",
            where_clause, limit_clause
        );

        let mut request = self.db.query(query);
        for binding in bindings {
            request = request.bind(binding);
        }

        let mut response = request.await?;
        let rows: Vec<JobRow> = response.take(0)?;

        rows.into_iter().map(Job::try_from).collect()
    }

    /// Record a job's new lifecycle state.
    pub async fn update_status(&self, id: JobId, status: &JobStatus) -> Result<Job, DbError> {
        let record: Option<JobRow> = self
            .db
            .update(("job", id.to_string()))
            .merge(serde_json::json!({
                "status": status,
                "updated_at": Utc::now(),
            }))
            .await?;

        record
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))
            .and_then(Job::try_from)
    }

    /// Count jobs of a type by lifecycle state.
    pub async fn count_by_state(&self, job_type: &str) -> Result<HashMap<String, u64>, DbError> {
        let mut response = self
            .db
            .query(
                r#"
                SELECT status.state AS state, count() AS count
                FROM job
                WHERE job_type = $job_type
                GROUP BY state
                "#,
            )
            .bind(("job_type", job_type.to_owned()))
            .await?;

        #[derive(Deserialize)]
        struct StateCount {
            state: Option<String>,
            count: i64,
        }

        let counts: Vec<StateCount> = response.take(0)?;

        Ok(counts
            .into_iter()
            .filter_map(|c| c.state.map(|state| (state, c.count.max(0) as u64)))
            .collect())
    }
}
