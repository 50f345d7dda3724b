//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// This creates all necessary tables, fields, and indexes.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(COUNTER_SCHEMA).await?.check()?;
    db.query(JOB_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Remaining-capacity counters, one record per resource.
const COUNTER_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS counter SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS remaining ON counter TYPE int ASSERT $value >= 0;
DEFINE FIELD IF NOT EXISTS updated_at ON counter TYPE datetime DEFAULT time::now();
"#;

/// Job table schema.
const JOB_SCHEMA: &str = r#"
-- Every job's latest lifecycle state, kept after it finishes
DEFINE TABLE IF NOT EXISTS job SCHEMALESS;

DEFINE FIELD IF NOT EXISTS job_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS job_type ON job TYPE string;
DEFINE FIELD IF NOT EXISTS timeout_secs ON job TYPE int DEFAULT 300;

DEFINE INDEX IF NOT EXISTS job_type ON job FIELDS job_type;
DEFINE INDEX IF NOT EXISTS job_state ON job FIELDS status.state;
DEFINE INDEX IF NOT EXISTS job_type_state ON job FIELDS job_type, status.state;
"#;
