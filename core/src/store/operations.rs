use chrono::{DateTime, Utc};
use sqlx::Row;

use super::{Store, parse_datetime};
use crate::{
  error::{AppError, AppResult, ErrorKind},
  model::{
    BatchDetail, BatchGroupId, Operation, OperationId, OperationStatus,
    OperationType,
  },
};

/// Query filter for `GET /api/operations` (spec §6).
#[derive(Debug, Default, Clone)]
pub struct OperationFilter {
  pub container_name: Option<String>,
  pub status: Option<OperationStatus>,
  pub from: Option<DateTime<Utc>>,
  pub to: Option<DateTime<Utc>>,
  pub limit: i64,
}

impl Store {
  pub async fn insert_operation(&self, op: &Operation) -> AppResult<()> {
    sqlx::query(
      "INSERT INTO operations \
       (operation_id, batch_group_id, container_name, stack_name, op_type, \
        status, old_version, new_version, error_message, created_at, \
        started_at, completed_at) \
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(op.operation_id.to_string())
    .bind(op.batch_group_id.map(|id| id.to_string()))
    .bind(&op.container_name)
    .bind(&op.stack_name)
    .bind(op.op_type.to_string())
    .bind(op.status.to_string())
    .bind(&op.old_version)
    .bind(&op.new_version)
    .bind(&op.error_message)
    .bind(op.created_at.to_rfc3339())
    .bind(op.started_at.map(|t| t.to_rfc3339()))
    .bind(op.completed_at.map(|t| t.to_rfc3339()))
    .execute(self.pool())
    .await?;
    Ok(())
  }

  /// Applies `next`, rejecting any non-monotonic transition (spec §4.8).
  /// Sets `started_at` on first entry to `InProgress` and `completed_at`
  /// on reaching a terminal status.
  pub async fn transition_operation(
    &self,
    id: OperationId,
    next: OperationStatus,
    error_message: Option<&str>,
  ) -> AppResult<()> {
    let mut tx = self.pool().begin().await?;

    let row = sqlx::query("SELECT status FROM operations WHERE operation_id = ?")
      .bind(id.to_string())
      .fetch_optional(&mut *tx)
      .await?
      .ok_or_else(|| AppError::not_found(format!("operation {id} not found")))?;

    let current: String = row.try_get("status")?;
    let current = OperationStatus::from_str_loose(&current)?;
    if !current.can_transition_to(next) {
      return Err(AppError::new(
        ErrorKind::ValidationError,
        anyhow::anyhow!("illegal operation transition {current} -> {next}"),
      ));
    }

    let now = Utc::now().to_rfc3339();
    let started_clause = matches!(current, OperationStatus::Pending)
      && matches!(next, OperationStatus::InProgress);

    sqlx::query(
      "UPDATE operations SET status = ?, error_message = COALESCE(?, error_message), \
       started_at = CASE WHEN ? THEN ? ELSE started_at END, \
       completed_at = CASE WHEN ? THEN ? ELSE completed_at END \
       WHERE operation_id = ?",
    )
    .bind(next.to_string())
    .bind(error_message)
    .bind(started_clause)
    .bind(&now)
    .bind(next.is_terminal())
    .bind(&now)
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
  }

  pub async fn set_versions(
    &self,
    id: OperationId,
    old_version: Option<&str>,
    new_version: Option<&str>,
  ) -> AppResult<()> {
    sqlx::query(
      "UPDATE operations SET old_version = ?, new_version = ? WHERE operation_id = ?",
    )
    .bind(old_version)
    .bind(new_version)
    .bind(id.to_string())
    .execute(self.pool())
    .await?;
    Ok(())
  }

  pub async fn upsert_batch_detail(&self, detail: &BatchDetail) -> AppResult<()> {
    sqlx::query(
      "INSERT INTO batch_details \
       (operation_id, container_name, status, old_version, new_version, message) \
       VALUES (?, ?, ?, ?, ?, ?) \
       ON CONFLICT(operation_id, container_name) DO UPDATE SET \
       status = excluded.status, old_version = excluded.old_version, \
       new_version = excluded.new_version, message = excluded.message",
    )
    .bind(detail.operation_id.to_string())
    .bind(&detail.container_name)
    .bind(detail.status.to_string())
    .bind(&detail.old_version)
    .bind(&detail.new_version)
    .bind(&detail.message)
    .execute(self.pool())
    .await?;
    Ok(())
  }

  pub async fn get_operation(&self, id: OperationId) -> AppResult<Operation> {
    let row = sqlx::query(
      "SELECT operation_id, batch_group_id, container_name, stack_name, op_type, \
       status, old_version, new_version, error_message, created_at, started_at, \
       completed_at FROM operations WHERE operation_id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(self.pool())
    .await?
    .ok_or_else(|| AppError::not_found(format!("operation {id} not found")))?;

    let mut op = row_to_operation(&row)?;
    op.batch_details = self.batch_details_for(id).await?;
    Ok(op)
  }

  pub async fn batch_details_for(
    &self,
    id: OperationId,
  ) -> AppResult<Vec<BatchDetail>> {
    let rows = sqlx::query(
      "SELECT operation_id, container_name, status, old_version, new_version, message \
       FROM batch_details WHERE operation_id = ?",
    )
    .bind(id.to_string())
    .fetch_all(self.pool())
    .await?;

    rows.iter().map(row_to_batch_detail).collect()
  }

  pub async fn operations_for_batch_group(
    &self,
    group: BatchGroupId,
  ) -> AppResult<Vec<Operation>> {
    let rows = sqlx::query(
      "SELECT operation_id, batch_group_id, container_name, stack_name, op_type, \
       status, old_version, new_version, error_message, created_at, started_at, \
       completed_at FROM operations WHERE batch_group_id = ? ORDER BY created_at",
    )
    .bind(group.to_string())
    .fetch_all(self.pool())
    .await?;

    let mut ops = Vec::with_capacity(rows.len());
    for row in &rows {
      let mut op = row_to_operation(row)?;
      op.batch_details = self.batch_details_for(op.operation_id).await?;
      ops.push(op);
    }
    Ok(ops)
  }

  pub async fn list_operations(
    &self,
    filter: &OperationFilter,
  ) -> AppResult<Vec<Operation>> {
    let mut sql = String::from(
      "SELECT operation_id, batch_group_id, container_name, stack_name, op_type, \
       status, old_version, new_version, error_message, created_at, started_at, \
       completed_at FROM operations WHERE 1=1",
    );
    if filter.container_name.is_some() {
      sql.push_str(" AND container_name = ?");
    }
    if filter.status.is_some() {
      sql.push_str(" AND status = ?");
    }
    if filter.from.is_some() {
      sql.push_str(" AND created_at >= ?");
    }
    if filter.to.is_some() {
      sql.push_str(" AND created_at <= ?");
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT ?");

    let mut query = sqlx::query(&sql);
    if let Some(name) = &filter.container_name {
      query = query.bind(name);
    }
    if let Some(status) = filter.status {
      query = query.bind(status.to_string());
    }
    if let Some(from) = filter.from {
      query = query.bind(from.to_rfc3339());
    }
    if let Some(to) = filter.to {
      query = query.bind(to.to_rfc3339());
    }
    let limit = if filter.limit > 0 { filter.limit } else { 100 };
    query = query.bind(limit);

    let rows = query.fetch_all(self.pool()).await?;
    rows.iter().map(row_to_operation).collect()
  }
}

fn row_to_operation(row: &sqlx::sqlite::SqliteRow) -> AppResult<Operation> {
  let operation_id: String = row.try_get("operation_id")?;
  let batch_group_id: Option<String> = row.try_get("batch_group_id")?;
  let op_type: String = row.try_get("op_type")?;
  let status: String = row.try_get("status")?;
  let created_at: String = row.try_get("created_at")?;
  let started_at: Option<String> = row.try_get("started_at")?;
  let completed_at: Option<String> = row.try_get("completed_at")?;

  Ok(Operation {
    operation_id: operation_id
      .parse()
      .map_err(|e| AppError::new(ErrorKind::DatabaseError, anyhow::anyhow!("{e}")))?,
    batch_group_id: batch_group_id
      .map(|s| uuid::Uuid::parse_str(&s).map(BatchGroupId))
      .transpose()
      .map_err(|e| AppError::new(ErrorKind::DatabaseError, anyhow::anyhow!("{e}")))?,
    container_name: row.try_get("container_name")?,
    stack_name: row.try_get("stack_name")?,
    op_type: OperationType::from_str_loose(&op_type)?,
    status: OperationStatus::from_str_loose(&status)?,
    old_version: row.try_get("old_version")?,
    new_version: row.try_get("new_version")?,
    error_message: row.try_get("error_message")?,
    created_at: parse_datetime(&created_at)?,
    started_at: started_at.map(|s| parse_datetime(&s)).transpose()?,
    completed_at: completed_at.map(|s| parse_datetime(&s)).transpose()?,
    batch_details: Vec::new(),
  })
}

fn row_to_batch_detail(row: &sqlx::sqlite::SqliteRow) -> AppResult<BatchDetail> {
  let operation_id: String = row.try_get("operation_id")?;
  let status: String = row.try_get("status")?;
  Ok(BatchDetail {
    operation_id: operation_id
      .parse()
      .map_err(|e| AppError::new(ErrorKind::DatabaseError, anyhow::anyhow!("{e}")))?,
    container_name: row.try_get("container_name")?,
    status: OperationStatus::from_str_loose(&status)?,
    old_version: row.try_get("old_version")?,
    new_version: row.try_get("new_version")?,
    message: row.try_get("message")?,
  })
}

/// `strum::EnumString::from_str` shadowed under a name that doesn't clash
/// with `std::str::FromStr`, since all three enums derive it.
trait FromStrLoose: Sized {
  fn from_str_loose(s: &str) -> AppResult<Self>;
}

impl FromStrLoose for OperationStatus {
  fn from_str_loose(s: &str) -> AppResult<Self> {
    <Self as std::str::FromStr>::from_str(s).map_err(|_| {
      AppError::new(
        ErrorKind::DatabaseError,
        anyhow::anyhow!("unrecognized operation status {s:?} in store"),
      )
    })
  }
}

impl FromStrLoose for OperationType {
  fn from_str_loose(s: &str) -> AppResult<Self> {
    <Self as std::str::FromStr>::from_str(s).map_err(|_| {
      AppError::new(
        ErrorKind::DatabaseError,
        anyhow::anyhow!("unrecognized operation type {s:?} in store"),
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn insert_and_fetch_round_trips() {
    let store = Store::connect_in_memory().await.unwrap();
    let op = Operation::new(
      OperationType::Single,
      Some("web".to_string()),
      Some("stack".to_string()),
      None,
    );
    store.insert_operation(&op).await.unwrap();

    let fetched = store.get_operation(op.operation_id).await.unwrap();
    assert_eq!(fetched.operation_id, op.operation_id);
    assert_eq!(fetched.status, OperationStatus::Pending);
  }

  #[tokio::test]
  async fn rejects_non_monotonic_transition() {
    let store = Store::connect_in_memory().await.unwrap();
    let op = Operation::new(OperationType::Single, None, None, None);
    store.insert_operation(&op).await.unwrap();

    store
      .transition_operation(op.operation_id, OperationStatus::Complete, None)
      .await
      .unwrap_err();
  }

  #[tokio::test]
  async fn legal_transition_sets_started_and_completed() {
    let store = Store::connect_in_memory().await.unwrap();
    let op = Operation::new(OperationType::Single, None, None, None);
    store.insert_operation(&op).await.unwrap();

    store
      .transition_operation(op.operation_id, OperationStatus::InProgress, None)
      .await
      .unwrap();
    store
      .transition_operation(op.operation_id, OperationStatus::Complete, None)
      .await
      .unwrap();

    let fetched = store.get_operation(op.operation_id).await.unwrap();
    assert!(fetched.started_at.is_some());
    assert!(fetched.completed_at.is_some());
  }
}
