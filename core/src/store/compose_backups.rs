use sqlx::Row;

use super::{Store, parse_datetime};
use crate::{error::AppResult, model::ComposeBackup};

impl Store {
  pub async fn insert_compose_backup(
    &self,
    backup: &ComposeBackup,
  ) -> AppResult<()> {
    sqlx::query(
      "INSERT INTO compose_backups \
       (operation_id, container_name, stack_name, compose_file_path, \
        backup_file_path, backup_timestamp, env_backup_file_path) \
       VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(backup.operation_id.to_string())
    .bind(&backup.container_name)
    .bind(&backup.stack_name)
    .bind(&backup.compose_file_path)
    .bind(&backup.backup_file_path)
    .bind(backup.backup_timestamp.to_rfc3339())
    .bind(&backup.env_backup_file_path)
    .execute(self.pool())
    .await?;
    Ok(())
  }

  pub async fn compose_backup_for(
    &self,
    operation_id: crate::model::OperationId,
  ) -> AppResult<Option<ComposeBackup>> {
    let row = sqlx::query(
      "SELECT operation_id, container_name, stack_name, compose_file_path, \
       backup_file_path, backup_timestamp, env_backup_file_path \
       FROM compose_backups WHERE operation_id = ?",
    )
    .bind(operation_id.to_string())
    .fetch_optional(self.pool())
    .await?;

    row.map(|row| {
      let backup_timestamp: String = row.try_get("backup_timestamp")?;
      Ok(ComposeBackup {
        operation_id,
        container_name: row.try_get("container_name")?,
        stack_name: row.try_get("stack_name")?,
        compose_file_path: row.try_get("compose_file_path")?,
        backup_file_path: row.try_get("backup_file_path")?,
        backup_timestamp: parse_datetime(&backup_timestamp)?,
        env_backup_file_path: row.try_get("env_backup_file_path")?,
      })
    })
    .transpose()
  }

  pub async fn list_compose_backups(&self) -> AppResult<Vec<ComposeBackup>> {
    let rows = sqlx::query(
      "SELECT operation_id, container_name, stack_name, compose_file_path, \
       backup_file_path, backup_timestamp, env_backup_file_path \
       FROM compose_backups ORDER BY backup_timestamp DESC",
    )
    .fetch_all(self.pool())
    .await?;

    rows
      .iter()
      .map(|row| {
        let operation_id: String = row.try_get("operation_id")?;
        let backup_timestamp: String = row.try_get("backup_timestamp")?;
        Ok(ComposeBackup {
          operation_id: operation_id.parse().map_err(|e| {
            crate::error::AppError::new(
              crate::error::ErrorKind::DatabaseError,
              anyhow::anyhow!("{e}"),
            )
          })?,
          container_name: row.try_get("container_name")?,
          stack_name: row.try_get("stack_name")?,
          compose_file_path: row.try_get("compose_file_path")?,
          backup_file_path: row.try_get("backup_file_path")?,
          backup_timestamp: parse_datetime(&backup_timestamp)?,
          env_backup_file_path: row.try_get("env_backup_file_path")?,
        })
      })
      .collect()
  }
}
