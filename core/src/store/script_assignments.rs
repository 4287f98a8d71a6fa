use sqlx::Row;

use super::{Store, parse_datetime};
use crate::{error::AppResult, model::ScriptAssignment};

impl Store {
  pub async fn upsert_script_assignment(
    &self,
    assignment: &ScriptAssignment,
  ) -> AppResult<()> {
    sqlx::query(
      "INSERT INTO script_assignments \
       (container_name, script_path, enabled, ignore_flag, allow_latest, \
        assigned_at, assigned_by, updated_at) \
       VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
       ON CONFLICT(container_name) DO UPDATE SET \
       script_path = excluded.script_path, enabled = excluded.enabled, \
       ignore_flag = excluded.ignore_flag, allow_latest = excluded.allow_latest, \
       updated_at = excluded.updated_at",
    )
    .bind(&assignment.container_name)
    .bind(&assignment.script_path)
    .bind(assignment.enabled)
    .bind(assignment.ignore)
    .bind(assignment.allow_latest)
    .bind(assignment.assigned_at.to_rfc3339())
    .bind(&assignment.assigned_by)
    .bind(assignment.updated_at.to_rfc3339())
    .execute(self.pool())
    .await?;
    Ok(())
  }

  pub async fn remove_script_assignment(
    &self,
    container_name: &str,
  ) -> AppResult<()> {
    sqlx::query("DELETE FROM script_assignments WHERE container_name = ?")
      .bind(container_name)
      .execute(self.pool())
      .await?;
    Ok(())
  }

  pub async fn script_assignment_for(
    &self,
    container_name: &str,
  ) -> AppResult<Option<ScriptAssignment>> {
    let row = sqlx::query(
      "SELECT container_name, script_path, enabled, ignore_flag, allow_latest, \
       assigned_at, assigned_by, updated_at FROM script_assignments \
       WHERE container_name = ?",
    )
    .bind(container_name)
    .fetch_optional(self.pool())
    .await?;

    row.map(row_to_assignment).transpose()
  }

  pub async fn list_script_assignments(
    &self,
  ) -> AppResult<Vec<ScriptAssignment>> {
    let rows = sqlx::query(
      "SELECT container_name, script_path, enabled, ignore_flag, allow_latest, \
       assigned_at, assigned_by, updated_at FROM script_assignments \
       ORDER BY container_name",
    )
    .fetch_all(self.pool())
    .await?;

    rows.iter().map(row_to_assignment).collect()
  }
}

fn row_to_assignment(
  row: &sqlx::sqlite::SqliteRow,
) -> AppResult<ScriptAssignment> {
  let assigned_at: String = row.try_get("assigned_at")?;
  let updated_at: String = row.try_get("updated_at")?;
  Ok(ScriptAssignment {
    container_name: row.try_get("container_name")?,
    script_path: row.try_get("script_path")?,
    enabled: row.try_get("enabled")?,
    ignore: row.try_get("ignore_flag")?,
    allow_latest: row.try_get("allow_latest")?,
    assigned_at: parse_datetime(&assigned_at)?,
    assigned_by: row.try_get("assigned_by")?,
    updated_at: parse_datetime(&updated_at)?,
  })
}
