//! Rollback (spec §4.9): restores the compose-file (and `.env`, when the
//! mutation went through an env reference) backup, re-recreates the
//! service, and waits for health - the inverse of `pull_and_recreate`.
//! Both the auto-rollback-on-failure path and the manual `POST
//! /api/rollback` path share `restore_and_recreate`; they differ only in
//! where the backup pair and target come from.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::{
  compose::{self, BackupPair},
  context::RuntimeContext,
  docker::{HealthOutcome, wait_for_health},
  error::{AppError, AppResult, ErrorKind},
  eventbus::Event,
  model::{Container, Operation, OperationId, OperationStatus, OperationType},
};

use super::{HEALTH_CHECK_TIMEOUT, compose_target, find_container_id};

/// Invoked from the failed-update path while the stack lock from the
/// original operation is still held. Runs under the *same* operation id
/// that failed - rollback is recorded as a stage of that operation, not a
/// new one, so `err` on return means the operation stays `failed` with a
/// two-part message (spec §4.9's "if rollback itself fails" clause).
pub async fn auto_rollback(
  ctx: &Arc<RuntimeContext>,
  operation_id: OperationId,
  container: &Container,
  target: &compose_target::ComposeTarget,
  compose_backup: &BackupPair,
  env_backup: Option<&BackupPair>,
) -> AppResult<OperationId> {
  emit(ctx, operation_id, container, "rolling_back", 90).await;
  restore_and_recreate(ctx, operation_id, container, target, compose_backup, env_backup)
    .await?;
  Ok(operation_id)
}

/// `POST /api/rollback`: reverses a *completed* update by replaying its
/// recorded compose backup under a brand-new operation, rather than
/// mutating the original record. The original's own compose/env backup
/// files are located via `Store::compose_backup_for`, and the target is
/// re-resolved fresh (the container may have been recreated since).
pub async fn rollback_operation(
  ctx: &Arc<RuntimeContext>,
  original_operation_id: OperationId,
) -> AppResult<OperationId> {
  let original = ctx.store.get_operation(original_operation_id).await?;
  let container_name = original.container_name.clone().ok_or_else(|| {
    AppError::new(
      ErrorKind::ValidationError,
      anyhow::anyhow!("operation {original_operation_id} has no container to roll back"),
    )
  })?;

  let backup_row = ctx
    .store
    .compose_backup_for(original_operation_id)
    .await?
    .ok_or_else(|| {
      AppError::new(
        ErrorKind::NotFound,
        anyhow::anyhow!("no compose backup recorded for operation {original_operation_id}"),
      )
    })?;

  let containers = ctx.docker.list_containers().await?;
  let container = containers
    .into_iter()
    .find(|c| c.name == container_name)
    .ok_or_else(|| AppError::not_found(format!("container {container_name} not found")))?;

  let lock_key = RuntimeContext::lock_key(container.stack.as_deref(), &container.name);
  let lock = ctx.stack_locks.get(&lock_key).await;
  let _guard = lock.lock().await;

  let target = compose_target::resolve(&container)?;

  let compose_backup = BackupPair {
    original: std::path::PathBuf::from(&backup_row.compose_file_path),
    backup: std::path::PathBuf::from(&backup_row.backup_file_path),
  };
  let env_backup = backup_row.env_backup_file_path.as_ref().map(|backup| BackupPair {
    original: env_original_path(&target),
    backup: std::path::PathBuf::from(backup),
  });

  let op = Operation::new(
    OperationType::Rollback,
    Some(container.name.clone()),
    container.stack.clone(),
    None,
  );
  ctx.store.insert_operation(&op).await?;
  let operation_id = op.operation_id;
  ctx
    .store
    .transition_operation(operation_id, OperationStatus::InProgress, None)
    .await?;
  emit(ctx, operation_id, &container, "rolling_back", 20).await;

  let result = restore_and_recreate(
    ctx,
    operation_id,
    &container,
    &target,
    &compose_backup,
    env_backup.as_ref(),
  )
  .await;

  match result {
    Ok(()) => {
      ctx
        .store
        .transition_operation(operation_id, OperationStatus::Complete, None)
        .await?;
      emit(ctx, operation_id, &container, "complete", 100).await;
      Ok(operation_id)
    }
    Err(e) => {
      let message = e.message();
      ctx
        .store
        .transition_operation(operation_id, OperationStatus::Failed, Some(&message))
        .await?;
      emit(ctx, operation_id, &container, "failed", 100).await;
      Err(e)
    }
  }
}

async fn restore_and_recreate(
  ctx: &Arc<RuntimeContext>,
  operation_id: OperationId,
  container: &Container,
  target: &compose_target::ComposeTarget,
  compose_backup: &BackupPair,
  env_backup: Option<&BackupPair>,
) -> AppResult<()> {
  compose::restore_backup(compose_backup).map_err(|e| {
    AppError::new(ErrorKind::RollbackFailed, anyhow::Error::new(e))
  })?;
  if let Some(env_backup) = env_backup {
    compose::restore_backup(env_backup).map_err(|e| {
      AppError::new(ErrorKind::RollbackFailed, anyhow::Error::new(e))
    })?;
  }

  let recreate = ctx
    .docker
    .compose_up(&target.host_project_dir, &target.primary_compose_path, &target.service)
    .await;
  if !recreate.success() {
    return Err(AppError::new(
      ErrorKind::RollbackFailed,
      anyhow::anyhow!("compose up during rollback failed: {}", recreate.stderr.trim()),
    ));
  }

  let recreated_id = find_container_id(ctx, &container.name).await.map_err(|e| {
    AppError::new(ErrorKind::RollbackFailed, anyhow::anyhow!("{}", e.message()))
  })?;
  match wait_for_health(&ctx.docker, &recreated_id, HEALTH_CHECK_TIMEOUT).await {
    Ok(HealthOutcome::Success) => Ok(()),
    Ok(other) => {
      warn!(container = %container.name, outcome = ?other, "rollback recreate did not report healthy");
      Err(AppError::new(
        ErrorKind::RollbackFailed,
        anyhow::anyhow!("container did not become healthy after rollback recreate"),
      ))
    }
    Err(e) => Err(AppError::new(ErrorKind::RollbackFailed, e)),
  }
}

fn env_original_path(target: &compose_target::ComposeTarget) -> std::path::PathBuf {
  let compose_dir =
    target.doc.path.parent().unwrap_or_else(|| std::path::Path::new("."));
  let service_env_files = target.doc.env_file_paths(&target.location);
  crate::compose::env_file::resolve_env_file(compose_dir, &service_env_files)
}

async fn emit(
  ctx: &Arc<RuntimeContext>,
  operation_id: OperationId,
  container: &Container,
  stage: &str,
  percent: u8,
) {
  ctx
    .events
    .publish(Event::UpdateProgress {
      operation_id,
      batch_group_id: None,
      container_name: container.name.clone(),
      stack_name: container.stack.clone(),
      stage: stage.to_string(),
      percent,
      message: None,
      timestamp: Utc::now(),
    })
    .await;
  let _ = ctx
    .store
    .append_update_log(operation_id, Some(&container.name), stage, None)
    .await;
}
