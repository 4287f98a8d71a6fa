//! Self-update path (spec §4.9): when the update target is the container
//! the manager itself runs in, it can't wait out its own recreate - the
//! `docker compose up` that replaces it also kills the process doing the
//! waiting. Instead it writes `pending_restart`, fires the recreate
//! without awaiting it, and exits; the *next* process, on startup, finds
//! the dangling record and finalizes it.

use std::{sync::Arc, time::Duration};

use tracing::{info, warn};

use crate::{
  context::RuntimeContext,
  error::{AppError, AppResult, ErrorKind},
  model::{
    BatchGroupId, Container, Operation, OperationId, OperationStatus,
    OperationType,
  },
  store::OperationFilter,
};

use super::compose_target;

/// Key in the `config` table naming the container id that was mid-recreate
/// when this process last wrote `pending_restart` (spec §9's "self
/// identification becomes explicit runtime context" note - this is the
/// one piece of that context that must outlive the process restarting).
const SELF_UPDATE_CONTAINER_ID_KEY: &str = "self_update_container_id";

/// Grace period between firing the detached recreate and exiting, so the
/// `docker compose up` invocation has been launched (not necessarily
/// finished) before this process stops being able to run it.
const EXIT_GRACE: Duration = Duration::from_secs(2);

pub async fn start_self_update(
  ctx: &Arc<RuntimeContext>,
  container: Container,
  new_tag: String,
  batch_group_id: Option<BatchGroupId>,
) -> AppResult<OperationId> {
  let op = Operation::new(
    OperationType::Single,
    Some(container.name.clone()),
    container.stack.clone(),
    batch_group_id,
  );
  ctx.store.insert_operation(&op).await?;
  let operation_id = op.operation_id;
  ctx
    .store
    .enqueue_update(operation_id, &container.name, container.stack.as_deref())
    .await?;

  let ctx = ctx.clone();
  tokio::spawn(async move {
    run_self_update(&ctx, operation_id, container, new_tag).await;
  });

  Ok(operation_id)
}

async fn run_self_update(
  ctx: &Arc<RuntimeContext>,
  operation_id: OperationId,
  container: Container,
  new_tag: String,
) {
  let lock_key = RuntimeContext::lock_key(container.stack.as_deref(), &container.name);
  let lock = ctx.stack_locks.get(&lock_key).await;
  let _guard = lock.lock().await;

  if let Err(e) = run_self_update_inner(ctx, operation_id, &container, &new_tag).await {
    let message = e.message();
    warn!(container = %container.name, error = %message, "self-update failed before recreate");
    let _ = ctx
      .store
      .transition_operation(operation_id, OperationStatus::Failed, Some(&message))
      .await;
    let _ = ctx.store.dequeue_update(operation_id).await;
    super::emit(ctx, operation_id, None, &container, "failed", 100, Some(message)).await;
    return;
  }

  info!(container = %container.name, "self-update recreate fired, exiting for replacement");
  tokio::time::sleep(EXIT_GRACE).await;
  std::process::exit(0);
}

async fn run_self_update_inner(
  ctx: &Arc<RuntimeContext>,
  operation_id: OperationId,
  container: &Container,
  new_tag: &str,
) -> AppResult<()> {
  ctx
    .store
    .transition_operation(operation_id, OperationStatus::InProgress, None)
    .await?;
  super::emit(ctx, operation_id, None, container, "validating", 5, None).await;

  let target = compose_target::resolve(container)?;

  super::emit(ctx, operation_id, None, container, "backup", 20, None).await;
  super::emit(ctx, operation_id, None, container, "updating_compose", 30, None).await;
  super::mutate_compose(ctx, operation_id, container, &target, new_tag).await?;
  ctx
    .store
    .set_versions(operation_id, container.image_ref.tag.as_deref(), Some(new_tag))
    .await?;

  super::emit(ctx, operation_id, None, container, "pulling_image", 45, None).await;
  let new_image = format!("{}:{new_tag}", container.image_ref.full_repository());
  let pull = ctx.docker.pull_image(&new_image).await;
  if !pull.success() {
    return Err(AppError::new(
      ErrorKind::Unavailable,
      anyhow::anyhow!("docker pull {new_image} failed: {}", pull.stderr.trim()),
    ));
  }

  ctx
    .store
    .config_set(SELF_UPDATE_CONTAINER_ID_KEY, &container.id)
    .await?;

  ctx
    .store
    .transition_operation(operation_id, OperationStatus::PendingRestart, None)
    .await?;
  super::emit(ctx, operation_id, None, container, "pending_restart", 70, None).await;

  // The recreate kills this process once the new container takes over the
  // name, so it is launched detached rather than awaited.
  let docker = ctx.docker.clone();
  let host_project_dir = target.host_project_dir.clone();
  let primary_compose_path = target.primary_compose_path.clone();
  let service = target.service.clone();
  tokio::spawn(async move {
    let outcome = docker.compose_up(&host_project_dir, &primary_compose_path, &service).await;
    if !outcome.success() {
      warn!(stderr = %outcome.stderr.trim(), "self-update compose up reported failure");
    }
  });

  Ok(())
}

/// Startup recovery (spec §4.9): scans for operations this process's
/// predecessor left in `pending_restart`, verifies the replacement
/// container is the one now running under that name with the expected
/// tag, and finalizes the record. Runs once, from `main`, before the
/// scheduler starts.
pub async fn resume_pending_restarts(ctx: &Arc<RuntimeContext>) -> AppResult<()> {
  let pending = ctx
    .store
    .list_operations(&OperationFilter {
      status: Some(OperationStatus::PendingRestart),
      limit: 100,
      ..Default::default()
    })
    .await?;

  if pending.is_empty() {
    return Ok(());
  }

  let containers = ctx.docker.list_containers().await?;

  for op in pending {
    let Some(container_name) = &op.container_name else { continue };
    let replacement = containers.iter().find(|c| &c.name == container_name);

    let outcome = match replacement {
      Some(c) if op.new_version.as_deref() == c.image_ref.tag.as_deref() => {
        info!(container = %container_name, "self-update replacement verified, finalizing");
        ctx
          .store
          .transition_operation(op.operation_id, OperationStatus::Complete, None)
          .await
      }
      Some(c) => {
        let message = format!(
          "replacement container running tag {:?}, expected {:?}",
          c.image_ref.tag, op.new_version
        );
        warn!(container = %container_name, %message, "self-update resume mismatch");
        ctx
          .store
          .transition_operation(op.operation_id, OperationStatus::Failed, Some(&message))
          .await
      }
      None => {
        let message = "replacement container not found after restart".to_string();
        warn!(container = %container_name, "self-update resume could not find replacement");
        ctx
          .store
          .transition_operation(op.operation_id, OperationStatus::Failed, Some(&message))
          .await
      }
    };
    outcome?;
    let _ = ctx.store.dequeue_update(op.operation_id).await;
  }

  let _ = ctx.store.config_set(SELF_UPDATE_CONTAINER_ID_KEY, "").await;
  Ok(())
}
