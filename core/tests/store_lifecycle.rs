//! End-to-end exercise of the store against a real in-memory SQLite pool
//! (spec §3/§6): an operation moves through its whole legal transition
//! sequence while a batch detail, a compose backup, and a rollback policy
//! are recorded alongside it, then every read path that serves the HTTP
//! API is checked against what was written.

use docksmith_core::model::{
  BatchDetail, ComposeBackup, Operation, OperationStatus, OperationType,
  RollbackPolicy,
};
use docksmith_core::store::{OperationFilter, Store};

async fn store() -> Store {
  Store::connect_in_memory().await.expect("in-memory store connects")
}

#[tokio::test]
async fn full_update_operation_lifecycle() {
  let store = store().await;

  let op = Operation::new(
    OperationType::Single,
    Some("web".to_string()),
    Some("blog".to_string()),
    None,
  );
  let operation_id = op.operation_id;
  store.insert_operation(&op).await.unwrap();

  store
    .insert_compose_backup(&ComposeBackup {
      operation_id,
      container_name: "web".to_string(),
      stack_name: "blog".to_string(),
      compose_file_path: "/stacks/blog/docker-compose.yml".to_string(),
      backup_file_path: "/stacks/blog/.docker-compose.yml.backup.20260101-000000"
        .to_string(),
      backup_timestamp: chrono::Utc::now(),
      env_backup_file_path: None,
    })
    .await
    .unwrap();

  store
    .upsert_rollback_policy(&RollbackPolicy {
      container_name: "web".to_string(),
      auto_rollback: true,
      health_check_timeout_secs: 60,
    })
    .await
    .unwrap();

  store
    .transition_operation(operation_id, OperationStatus::InProgress, None)
    .await
    .unwrap();
  store.set_versions(operation_id, Some("1.20.0"), Some("1.21.0")).await.unwrap();
  store
    .transition_operation(operation_id, OperationStatus::Complete, None)
    .await
    .unwrap();

  let fetched = store.get_operation(operation_id).await.unwrap();
  assert_eq!(fetched.status, OperationStatus::Complete);
  assert_eq!(fetched.old_version.as_deref(), Some("1.20.0"));
  assert_eq!(fetched.new_version.as_deref(), Some("1.21.0"));
  assert!(fetched.started_at.is_some());
  assert!(fetched.completed_at.is_some());

  let backup = store.compose_backup_for(operation_id).await.unwrap().unwrap();
  assert_eq!(backup.container_name, "web");

  let policy = store.rollback_policy_for("web").await.unwrap().unwrap();
  assert!(policy.auto_rollback);
  assert_eq!(policy.health_check_timeout_secs, 60);

  let listed = store
    .list_operations(&OperationFilter {
      container_name: Some("web".to_string()),
      status: Some(OperationStatus::Complete),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].operation_id, operation_id);
}

#[tokio::test]
async fn failed_operation_records_error_and_completed_at() {
  let store = store().await;
  let op = Operation::new(OperationType::Single, Some("db".to_string()), None, None);
  store.insert_operation(&op).await.unwrap();

  store
    .transition_operation(op.operation_id, OperationStatus::InProgress, None)
    .await
    .unwrap();
  store
    .transition_operation(
      op.operation_id,
      OperationStatus::Failed,
      Some("health check timed out"),
    )
    .await
    .unwrap();

  let fetched = store.get_operation(op.operation_id).await.unwrap();
  assert_eq!(fetched.status, OperationStatus::Failed);
  assert_eq!(fetched.error_message.as_deref(), Some("health check timed out"));
  assert!(fetched.completed_at.is_some());
}

#[tokio::test]
async fn batch_group_aggregates_its_details() {
  let store = store().await;
  let batch_group_id = docksmith_core::model::BatchGroupId::new();

  let mut ids = Vec::new();
  for name in ["web", "worker"] {
    let op = Operation::new(
      OperationType::BatchUpdate,
      Some(name.to_string()),
      Some("blog".to_string()),
      Some(batch_group_id),
    );
    store.insert_operation(&op).await.unwrap();
    store
      .upsert_batch_detail(&BatchDetail {
        operation_id: op.operation_id,
        container_name: name.to_string(),
        status: OperationStatus::Pending,
        old_version: Some("1.0.0".to_string()),
        new_version: Some("1.1.0".to_string()),
        message: None,
      })
      .await
      .unwrap();
    ids.push(op.operation_id);
  }

  let group = store.operations_for_batch_group(batch_group_id).await.unwrap();
  assert_eq!(group.len(), 2);
  for op in &group {
    assert_eq!(op.batch_details.len(), 1);
    assert_eq!(op.batch_group_id, Some(batch_group_id));
  }
}
