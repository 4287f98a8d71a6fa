//! The non-update action types: `restart`, `stop`, `start`, `remove`, and
//! `fix-mismatch` (spec §4.9). Each is a short single-stage operation,
//! still serialized per stack so it can't race a concurrent update.

use std::sync::Arc;

use chrono::Utc;

use crate::{
  context::RuntimeContext,
  error::{AppError, AppResult, ErrorKind},
  eventbus::Event,
  model::{Container, Operation, OperationId, OperationStatus, OperationType},
};

use super::compose_target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Restart,
  Stop,
  Start,
  Remove,
  FixMismatch,
}

impl Action {
  fn op_type(self) -> OperationType {
    match self {
      Action::Restart => OperationType::Restart,
      Action::Stop => OperationType::Stop,
      Action::Start => OperationType::Start,
      Action::Remove => OperationType::Remove,
      Action::FixMismatch => OperationType::FixMismatch,
    }
  }

  fn stage_name(self) -> &'static str {
    match self {
      Action::Restart => "restarting",
      Action::Stop => "stopping",
      Action::Start => "starting",
      Action::Remove => "removing",
      Action::FixMismatch => "recreating",
    }
  }
}

pub async fn run_action(
  ctx: &Arc<RuntimeContext>,
  container: Container,
  action: Action,
) -> AppResult<OperationId> {
  let op = Operation::new(
    action.op_type(),
    Some(container.name.clone()),
    container.stack.clone(),
    None,
  );
  ctx.store.insert_operation(&op).await?;
  let operation_id = op.operation_id;

  let ctx = ctx.clone();
  tokio::spawn(async move {
    run(&ctx, operation_id, container, action).await;
  });

  Ok(operation_id)
}

async fn run(
  ctx: &Arc<RuntimeContext>,
  operation_id: OperationId,
  container: Container,
  action: Action,
) {
  let lock_key =
    RuntimeContext::lock_key(container.stack.as_deref(), &container.name);
  let lock = ctx.stack_locks.get(&lock_key).await;
  let _guard = lock.lock().await;

  let result = apply(ctx, operation_id, &container, action).await;

  let status = match &result {
    Ok(()) => OperationStatus::Complete,
    Err(_) => OperationStatus::Failed,
  };
  let message = result.as_ref().err().map(|e| e.message());
  let _ = ctx
    .store
    .transition_operation(operation_id, status, message.as_deref())
    .await;
  ctx
    .events
    .publish(Event::UpdateProgress {
      operation_id,
      batch_group_id: None,
      container_name: container.name.clone(),
      stack_name: container.stack.clone(),
      stage: if status == OperationStatus::Complete { "complete" } else { "failed" }
        .to_string(),
      percent: 100,
      message,
      timestamp: Utc::now(),
    })
    .await;
}

async fn apply(
  ctx: &Arc<RuntimeContext>,
  operation_id: OperationId,
  container: &Container,
  action: Action,
) -> AppResult<()> {
  ctx
    .store
    .transition_operation(operation_id, OperationStatus::InProgress, None)
    .await?;
  let _ = ctx
    .store
    .append_update_log(
      operation_id,
      Some(&container.name),
      action.stage_name(),
      None,
    )
    .await;

  if action == Action::Remove {
    ctx.docker.remove_container(&container.id).await?;
    return Ok(());
  }

  let target = compose_target::resolve(container)?;
  let outcome = match action {
    Action::Restart => {
      ctx
        .docker
        .compose_restart(
          &target.host_project_dir,
          &target.primary_compose_path,
          &target.service,
        )
        .await
    }
    Action::Stop => {
      ctx
        .docker
        .compose_stop(
          &target.host_project_dir,
          &target.primary_compose_path,
          &target.service,
        )
        .await
    }
    Action::Start => {
      ctx
        .docker
        .compose_start(
          &target.host_project_dir,
          &target.primary_compose_path,
          &target.service,
        )
        .await
    }
    Action::FixMismatch => {
      ctx
        .docker
        .compose_up(
          &target.host_project_dir,
          &target.primary_compose_path,
          &target.service,
        )
        .await
    }
    Action::Remove => unreachable!("handled above"),
  };

  if !outcome.success() {
    return Err(AppError::new(
      ErrorKind::Unavailable,
      anyhow::anyhow!("{} failed: {}", action.stage_name(), outcome.stderr.trim()),
    ));
  }
  Ok(())
}
