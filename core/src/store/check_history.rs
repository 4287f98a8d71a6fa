use sqlx::Row;

use super::{Store, parse_datetime};
use crate::{
  error::AppResult,
  model::{CheckHistoryEntry, DecisionStatus},
};

impl Store {
  pub async fn append_check_history(
    &self,
    entry: &CheckHistoryEntry,
  ) -> AppResult<()> {
    sqlx::query(
      "INSERT INTO check_history \
       (container_name, stack_name, status, current_version, latest_version, \
        checked_at, error) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.container_name)
    .bind(&entry.stack_name)
    .bind(serde_json::to_value(entry.status)?.as_str().unwrap_or_default())
    .bind(&entry.current_version)
    .bind(&entry.latest_version)
    .bind(entry.checked_at.to_rfc3339())
    .bind(&entry.error)
    .execute(self.pool())
    .await?;
    Ok(())
  }

  pub async fn recent_check_history(
    &self,
    limit: i64,
  ) -> AppResult<Vec<CheckHistoryEntry>> {
    let rows = sqlx::query(
      "SELECT container_name, stack_name, status, current_version, \
       latest_version, checked_at, error FROM check_history \
       ORDER BY checked_at DESC LIMIT ?",
    )
    .bind(if limit > 0 { limit } else { 100 })
    .fetch_all(self.pool())
    .await?;

    rows
      .iter()
      .map(|row| {
        let status: String = row.try_get("status")?;
        let checked_at: String = row.try_get("checked_at")?;
        Ok(CheckHistoryEntry {
          container_name: row.try_get("container_name")?,
          stack_name: row.try_get("stack_name")?,
          status: decision_status_from_str(&status),
          current_version: row.try_get("current_version")?,
          latest_version: row.try_get("latest_version")?,
          checked_at: parse_datetime(&checked_at)?,
          error: row.try_get("error")?,
        })
      })
      .collect()
  }
}

fn decision_status_from_str(s: &str) -> DecisionStatus {
  serde_json::from_value(serde_json::Value::String(s.to_string()))
    .unwrap_or(DecisionStatus::CheckFailed)
}
