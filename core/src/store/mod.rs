//! Persisted store (spec §6): a single local SQLite database file backing
//! every durable table named in the spec. Split by concern; each
//! submodule owns the queries for its table(s).
//!
//! A relational `sqlx`/SQLite store stands in for the upstream
//! MongoDB-document layout - there's one local file rather than a server
//! to run, which fits "single local database file" better than a document
//! store would (see DESIGN.md).

mod check_history;
mod compose_backups;
mod config;
mod operations;
mod rollback_policies;
mod script_assignments;
mod update_log;
mod update_queue;
mod version_cache;

pub use operations::OperationFilter;
pub use update_log::UpdateLogEntry;
pub use update_queue::QueuedUpdate;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::AppResult;

#[derive(Clone)]
pub struct Store {
  pool: SqlitePool,
}

impl Store {
  /// Opens (creating if absent) the database at `path` and applies any
  /// pending migrations.
  pub async fn connect(path: &str) -> anyhow::Result<Self> {
    let options =
      SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(8).connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(Store { pool })
  }

  /// Opens a throwaway in-memory database with migrations applied. Used by
  /// this crate's own unit tests and by the integration tests under
  /// `core/tests/`.
  pub async fn connect_in_memory() -> anyhow::Result<Self> {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(Store { pool })
  }

  pub(crate) fn pool(&self) -> &SqlitePool {
    &self.pool
  }
}

/// Runtime-checked conversions shared across the store's submodules.
pub(crate) fn parse_datetime(
  s: &str,
) -> AppResult<chrono::DateTime<chrono::Utc>> {
  chrono::DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&chrono::Utc))
    .map_err(|e| {
      crate::error::AppError::new(
        crate::error::ErrorKind::DatabaseError,
        anyhow::Error::new(e).context("malformed stored timestamp"),
      )
    })
}
