use chrono::Utc;
use sqlx::Row;

use super::Store;
use crate::{error::AppResult, model::OperationId};

/// A row surviving in `update_queue` at startup names an operation that
/// was queued but never reached `InProgress` before the process died -
/// crash recovery replays or fails these explicitly rather than leaving
/// them silently `pending` forever.
pub struct QueuedUpdate {
  pub operation_id: OperationId,
  pub container_name: String,
  pub stack_name: Option<String>,
}

impl Store {
  pub async fn enqueue_update(
    &self,
    operation_id: OperationId,
    container_name: &str,
    stack_name: Option<&str>,
  ) -> AppResult<()> {
    sqlx::query(
      "INSERT INTO update_queue (operation_id, container_name, stack_name, queued_at) \
       VALUES (?, ?, ?, ?)",
    )
    .bind(operation_id.to_string())
    .bind(container_name)
    .bind(stack_name)
    .bind(Utc::now().to_rfc3339())
    .execute(self.pool())
    .await?;
    Ok(())
  }

  pub async fn dequeue_update(&self, operation_id: OperationId) -> AppResult<()> {
    sqlx::query("DELETE FROM update_queue WHERE operation_id = ?")
      .bind(operation_id.to_string())
      .execute(self.pool())
      .await?;
    Ok(())
  }

  pub async fn queued_updates(&self) -> AppResult<Vec<QueuedUpdate>> {
    let rows = sqlx::query(
      "SELECT operation_id, container_name, stack_name FROM update_queue \
       ORDER BY queued_at",
    )
    .fetch_all(self.pool())
    .await?;

    rows
      .iter()
      .map(|row| {
        let operation_id: String = row.try_get("operation_id")?;
        Ok(QueuedUpdate {
          operation_id: operation_id.parse().map_err(|e| {
            crate::error::AppError::new(
              crate::error::ErrorKind::DatabaseError,
              anyhow::anyhow!("{e}"),
            )
          })?,
          container_name: row.try_get("container_name")?,
          stack_name: row.try_get("stack_name")?,
        })
      })
      .collect()
  }
}
