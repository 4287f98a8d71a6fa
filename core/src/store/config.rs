use chrono::Utc;
use sqlx::Row;

use super::Store;
use crate::{error::AppResult, model::ConfigSnapshot};

impl Store {
  /// Reads a value from the free-form `config` key/value table - used for
  /// the handful of settings that are edited at runtime (e.g. self
  /// container id survives a restart without relying on re-detection)
  /// rather than sourced from the environment at startup.
  pub async fn config_get(&self, key: &str) -> AppResult<Option<String>> {
    let row = sqlx::query("SELECT value FROM config WHERE key = ?")
      .bind(key)
      .fetch_optional(self.pool())
      .await?;
    row.map(|r| r.try_get("value")).transpose().map_err(Into::into)
  }

  pub async fn config_set(&self, key: &str, value: &str) -> AppResult<()> {
    sqlx::query(
      "INSERT INTO config (key, value, updated_at) VALUES (?, ?, ?) \
       ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
       updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now().to_rfc3339())
    .execute(self.pool())
    .await?;
    Ok(())
  }

  pub async fn insert_config_snapshot(
    &self,
    reason: &str,
    payload: serde_json::Value,
  ) -> AppResult<()> {
    sqlx::query(
      "INSERT INTO config_snapshots (taken_at, reason, payload) VALUES (?, ?, ?)",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(reason)
    .bind(payload.to_string())
    .execute(self.pool())
    .await?;
    Ok(())
  }

  pub async fn recent_config_snapshots(
    &self,
    limit: i64,
  ) -> AppResult<Vec<ConfigSnapshot>> {
    let rows = sqlx::query(
      "SELECT id, taken_at, reason, payload FROM config_snapshots \
       ORDER BY taken_at DESC LIMIT ?",
    )
    .bind(if limit > 0 { limit } else { 50 })
    .fetch_all(self.pool())
    .await?;

    rows
      .iter()
      .map(|row| {
        let taken_at: String = row.try_get("taken_at")?;
        let payload: String = row.try_get("payload")?;
        Ok(ConfigSnapshot {
          id: row.try_get("id")?,
          taken_at: super::parse_datetime(&taken_at)?,
          reason: row.try_get("reason")?,
          payload: serde_json::from_str(&payload).unwrap_or_default(),
        })
      })
      .collect()
  }
}
