use sqlx::Row;

use super::Store;
use crate::{error::AppResult, model::RollbackPolicy};

impl Store {
  pub async fn upsert_rollback_policy(
    &self,
    policy: &RollbackPolicy,
  ) -> AppResult<()> {
    sqlx::query(
      "INSERT INTO rollback_policies \
       (container_name, auto_rollback, health_check_timeout_secs) \
       VALUES (?, ?, ?) \
       ON CONFLICT(container_name) DO UPDATE SET \
       auto_rollback = excluded.auto_rollback, \
       health_check_timeout_secs = excluded.health_check_timeout_secs",
    )
    .bind(&policy.container_name)
    .bind(policy.auto_rollback)
    .bind(policy.health_check_timeout_secs as i64)
    .execute(self.pool())
    .await?;
    Ok(())
  }

  pub async fn rollback_policy_for(
    &self,
    container_name: &str,
  ) -> AppResult<Option<RollbackPolicy>> {
    let row = sqlx::query(
      "SELECT container_name, auto_rollback, health_check_timeout_secs \
       FROM rollback_policies WHERE container_name = ?",
    )
    .bind(container_name)
    .fetch_optional(self.pool())
    .await?;

    row
      .map(|row| {
        let timeout: i64 = row.try_get("health_check_timeout_secs")?;
        Ok(RollbackPolicy {
          container_name: row.try_get("container_name")?,
          auto_rollback: row.try_get("auto_rollback")?,
          health_check_timeout_secs: timeout as u64,
        })
      })
      .transpose()
  }
}
