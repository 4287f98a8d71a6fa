use chrono::Utc;
use sqlx::Row;

use super::{Store, parse_datetime};
use crate::{error::AppResult, model::OperationId};

pub struct UpdateLogEntry {
  pub operation_id: OperationId,
  pub container_name: Option<String>,
  pub stage: String,
  pub message: Option<String>,
  pub logged_at: chrono::DateTime<Utc>,
}

impl Store {
  /// Appends a structured log line alongside each progress-event emission
  /// (spec §4.9's "appends to a structured log").
  pub async fn append_update_log(
    &self,
    operation_id: OperationId,
    container_name: Option<&str>,
    stage: &str,
    message: Option<&str>,
  ) -> AppResult<()> {
    sqlx::query(
      "INSERT INTO update_log (operation_id, container_name, stage, message, logged_at) \
       VALUES (?, ?, ?, ?, ?)",
    )
    .bind(operation_id.to_string())
    .bind(container_name)
    .bind(stage)
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .execute(self.pool())
    .await?;
    Ok(())
  }

  pub async fn update_log_for(
    &self,
    operation_id: OperationId,
  ) -> AppResult<Vec<UpdateLogEntry>> {
    let rows = sqlx::query(
      "SELECT operation_id, container_name, stage, message, logged_at \
       FROM update_log WHERE operation_id = ? ORDER BY logged_at",
    )
    .bind(operation_id.to_string())
    .fetch_all(self.pool())
    .await?;

    rows
      .iter()
      .map(|row| {
        let logged_at: String = row.try_get("logged_at")?;
        Ok(UpdateLogEntry {
          operation_id,
          container_name: row.try_get("container_name")?,
          stage: row.try_get("stage")?,
          message: row.try_get("message")?,
          logged_at: parse_datetime(&logged_at)?,
        })
      })
      .collect()
  }
}
