//! SurrealDB integration for the reservation pipeline.
//!
//! This crate provides database connectivity, the capacity counter store,
//! and the job repository.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod counter;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect};
pub use counter::{CounterError, CounterStore, SurrealCounterStore};
pub use schema::init_schema;

/// Connect to the database and make sure the schema exists.
///
/// Every call returns an independent handle; `mem://` endpoints get their own
/// datastore.
pub async fn init(config: DbConfig) -> Result<Database, DbError> {
    let db = connect(&config).await?;
    init_schema(&db).await?;
    Ok(db)
}
