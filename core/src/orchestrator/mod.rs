//! Update Orchestrator (spec §4.9): drives a container through
//! `validating -> pre_check? -> backup -> updating_compose ->
//! pulling_image -> recreating -> health_check -> restarting_dependents? ->
//! complete`, rolling back on failure and serializing per stack via
//! [`crate::context::StackLocks`].

mod actions;
mod batch;
pub(crate) mod compose_target;
mod dependents;
mod rollback;
mod selfupdate;

pub use actions::Action;
pub use batch::{BatchItem, run_batch};
pub use rollback::rollback_operation;
pub use selfupdate::resume_pending_restarts;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tracing::{info, warn};

use crate::{
  compose::{self, ImageMutation, env_file},
  context::RuntimeContext,
  docker::{HealthOutcome, wait_for_health},
  error::{AppError, AppResult, ErrorKind},
  eventbus::Event,
  model::{
    BatchGroupId, ComposeBackup, Container, Operation, OperationId,
    OperationStatus, OperationType, Policy,
  },
};

use compose_target::ComposeTarget;

/// How long `health_check` waits for the recreated container to settle
/// (spec §4.4's default absent an explicit `rollback_policies` override).
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2 * 60);

pub struct Orchestrator {
  ctx: Arc<RuntimeContext>,
}

impl Orchestrator {
  pub fn new(ctx: Arc<RuntimeContext>) -> Self {
    Orchestrator { ctx }
  }

  pub fn is_self(&self, container: &Container) -> bool {
    self.ctx.config.self_container_id.as_deref() == Some(container.id.as_str())
  }

  /// Entry point for a single-container update. Inserts the operation row
  /// and returns its id immediately; the state machine runs detached so
  /// the API layer doesn't block on the stack lock or the recreate/health
  /// round trip.
  pub async fn update_container(
    &self,
    container: Container,
    policy: Policy,
    new_tag: String,
    batch_group_id: Option<BatchGroupId>,
    force: bool,
  ) -> AppResult<OperationId> {
    if self.is_self(&container) {
      return selfupdate::start_self_update(
        &self.ctx,
        container,
        new_tag,
        batch_group_id,
      )
      .await;
    }

    let op = Operation::new(
      OperationType::Single,
      Some(container.name.clone()),
      container.stack.clone(),
      batch_group_id,
    );
    self.ctx.store.insert_operation(&op).await?;
    let operation_id = op.operation_id;
    self
      .ctx
      .store
      .enqueue_update(operation_id, &container.name, container.stack.as_deref())
      .await?;

    let ctx = self.ctx.clone();
    tokio::spawn(async move {
      run_update(&ctx, operation_id, batch_group_id, container, policy, new_tag, force)
        .await;
    });

    Ok(operation_id)
  }

  pub async fn restart_container(&self, container: Container) -> AppResult<OperationId> {
    actions::run_action(&self.ctx, container, Action::Restart).await
  }

  pub async fn stop_container(&self, container: Container) -> AppResult<OperationId> {
    actions::run_action(&self.ctx, container, Action::Stop).await
  }

  pub async fn start_container(&self, container: Container) -> AppResult<OperationId> {
    actions::run_action(&self.ctx, container, Action::Start).await
  }

  pub async fn fix_mismatch(&self, container: Container) -> AppResult<OperationId> {
    actions::run_action(&self.ctx, container, Action::FixMismatch).await
  }

  pub async fn remove_container(&self, container: Container) -> AppResult<OperationId> {
    actions::run_action(&self.ctx, container, Action::Remove).await
  }
}

/// Runs the state machine under the stack lock, finalizing the operation
/// to `Complete` or `Failed` before returning.
async fn run_update(
  ctx: &Arc<RuntimeContext>,
  operation_id: OperationId,
  batch_group_id: Option<BatchGroupId>,
  container: Container,
  policy: Policy,
  new_tag: String,
  force: bool,
) {
  let lock_key =
    RuntimeContext::lock_key(container.stack.as_deref(), &container.name);
  let lock = ctx.stack_locks.get(&lock_key).await;
  let _guard = lock.lock().await;

  let result = run_update_inner(
    ctx,
    operation_id,
    batch_group_id,
    &container,
    &policy,
    &new_tag,
    force,
  )
  .await;

  let _ = ctx.store.dequeue_update(operation_id).await;

  match result {
    Ok(()) => {
      let _ = ctx
        .store
        .transition_operation(operation_id, OperationStatus::Complete, None)
        .await;
      emit(ctx, operation_id, batch_group_id, &container, "complete", 100, None)
        .await;
      ctx
        .events
        .publish(Event::ContainerUpdated {
          container_name: container.name.clone(),
          status: OperationStatus::Complete,
          old_version: container.image_ref.tag.clone(),
          new_version: Some(new_tag.clone()),
          timestamp: Utc::now(),
        })
        .await;

      if let Err(e) =
        dependents::restart_dependents(ctx, &container, operation_id, batch_group_id)
          .await
      {
        warn!(container = %container.name, error = %e, "dependent restart sweep failed");
      }
    }
    Err(e) => {
      let message = e.message();
      let _ = ctx
        .store
        .transition_operation(operation_id, OperationStatus::Failed, Some(&message))
        .await;
      emit(
        ctx,
        operation_id,
        batch_group_id,
        &container,
        "failed",
        100,
        Some(message),
      )
      .await;
    }
  }
}

async fn run_update_inner(
  ctx: &Arc<RuntimeContext>,
  operation_id: OperationId,
  batch_group_id: Option<BatchGroupId>,
  container: &Container,
  policy: &Policy,
  new_tag: &str,
  force: bool,
) -> AppResult<()> {
  ctx
    .store
    .transition_operation(operation_id, OperationStatus::InProgress, None)
    .await?;
  emit(ctx, operation_id, batch_group_id, container, "validating", 5, None).await;

  let target = compose_target::resolve(container)?;

  if let (Some(script), false) = (&policy.pre_update_check, force) {
    emit(ctx, operation_id, batch_group_id, container, "pre_check", 10, None).await;
    ctx.scripts.run_precheck(script, &container.name).await.map_err(|e| {
      AppError::new(ErrorKind::PrecheckFailed, anyhow::anyhow!("{e}"))
    })?;
  }

  emit(ctx, operation_id, batch_group_id, container, "backup", 20, None).await;
  emit(ctx, operation_id, batch_group_id, container, "updating_compose", 30, None).await;
  let (compose_backup, env_backup) =
    mutate_compose(ctx, operation_id, container, &target, new_tag).await?;

  ctx
    .store
    .set_versions(operation_id, container.image_ref.tag.as_deref(), Some(new_tag))
    .await?;

  let recreate_result =
    pull_and_recreate(ctx, operation_id, batch_group_id, container, &target, new_tag)
      .await;

  match recreate_result {
    Ok(()) => Ok(()),
    Err(e) if policy.auto_rollback => {
      warn!(container = %container.name, error = %e, "update failed, rolling back");
      match rollback::auto_rollback(
        ctx,
        operation_id,
        container,
        &target,
        &compose_backup,
        env_backup.as_ref(),
      )
      .await
      {
        Ok(rollback_id) => Err(AppError::new(
          e.kind,
          anyhow::anyhow!(
            "{} (rolled back via operation {rollback_id})",
            e.message()
          ),
        )),
        Err(rollback_err) => Err(AppError::new(
          ErrorKind::RollbackFailed,
          anyhow::anyhow!(
            "update failed: {}; rollback also failed: {}",
            e.message(),
            rollback_err.message()
          ),
        )),
      }
    }
    Err(e) => Err(e),
  }
}

/// Determines the mutation kind, backs up whatever file(s) it touches, and
/// writes the new content. The compose file is always backed up (needed
/// for restore regardless of mutation kind); the `.env` file only when the
/// tag is an `${ENV}` reference.
async fn mutate_compose(
  ctx: &Arc<RuntimeContext>,
  operation_id: OperationId,
  container: &Container,
  target: &ComposeTarget,
  new_tag: &str,
) -> AppResult<(compose::BackupPair, Option<compose::BackupPair>)> {
  let mutation = target
    .doc
    .set_image_tag(&target.location, new_tag)
    .map_err(compose_target::to_app_error)?;

  let compose_backup_pair = compose::take_backup(&target.doc.path)
    .map_err(|e| AppError::new(ErrorKind::ComposeParseError, anyhow::Error::new(e)))?;

  let env_backup_pair = match &mutation {
    ImageMutation::Inline { new_source } => {
      std::fs::write(&target.doc.path, new_source).map_err(|e| {
        AppError::new(ErrorKind::ComposeParseError, anyhow::Error::new(e))
      })?;
      None
    }
    ImageMutation::EnvReference { var_name } => {
      let compose_dir =
        target.doc.path.parent().unwrap_or_else(|| std::path::Path::new("."));
      let service_env_files = target.doc.env_file_paths(&target.location);
      let env_path = env_file::resolve_env_file(compose_dir, &service_env_files);
      let env_source = std::fs::read_to_string(&env_path).unwrap_or_default();
      let env_backup = compose::take_backup(&env_path).map_err(|e| {
        AppError::new(ErrorKind::ComposeParseError, anyhow::Error::new(e))
      })?;
      let updated = env_file::set_var(&env_source, var_name, new_tag);
      std::fs::write(&env_path, updated).map_err(|e| {
        AppError::new(ErrorKind::ComposeParseError, anyhow::Error::new(e))
      })?;
      Some(env_backup)
    }
  };

  ctx
    .store
    .insert_compose_backup(&ComposeBackup {
      operation_id,
      container_name: container.name.clone(),
      stack_name: container.stack.clone().unwrap_or_default(),
      compose_file_path: target.doc.path.to_string_lossy().to_string(),
      backup_file_path: compose_backup_pair.backup.to_string_lossy().to_string(),
      backup_timestamp: Utc::now(),
      env_backup_file_path: env_backup_pair
        .as_ref()
        .map(|p| p.backup.to_string_lossy().to_string()),
    })
    .await?;

  Ok((compose_backup_pair, env_backup_pair))
}

async fn pull_and_recreate(
  ctx: &Arc<RuntimeContext>,
  operation_id: OperationId,
  batch_group_id: Option<BatchGroupId>,
  container: &Container,
  target: &ComposeTarget,
  new_tag: &str,
) -> AppResult<()> {
  emit(ctx, operation_id, batch_group_id, container, "pulling_image", 45, None)
    .await;
  let new_image = format!("{}:{new_tag}", container.image_ref.full_repository());
  let pull = ctx.docker.pull_image(&new_image).await;
  if !pull.success() {
    return Err(AppError::new(
      ErrorKind::Unavailable,
      anyhow::anyhow!("docker pull {new_image} failed: {}", pull.stderr.trim()),
    ));
  }

  emit(ctx, operation_id, batch_group_id, container, "recreating", 65, None)
    .await;
  let recreate = ctx
    .docker
    .compose_up(&target.host_project_dir, &target.primary_compose_path, &target.service)
    .await;
  if !recreate.success() {
    return Err(AppError::new(
      ErrorKind::Unavailable,
      anyhow::anyhow!("compose up failed: {}", recreate.stderr.trim()),
    ));
  }

  emit(ctx, operation_id, batch_group_id, container, "health_check", 85, None)
    .await;
  let recreated_id = find_container_id(ctx, &container.name).await?;
  match wait_for_health(&ctx.docker, &recreated_id, HEALTH_CHECK_TIMEOUT).await? {
    HealthOutcome::Success => Ok(()),
    HealthOutcome::Unhealthy => Err(AppError::new(
      ErrorKind::Unavailable,
      anyhow::anyhow!("container reported unhealthy after recreate"),
    )),
    HealthOutcome::Timeout => Err(AppError::new(
      ErrorKind::Timeout,
      anyhow::anyhow!("health check timed out after recreate"),
    )),
  }
}

/// Looks up the (possibly new) container id by name - recreate replaces
/// the container, so its id changes even though the name doesn't.
async fn find_container_id(ctx: &Arc<RuntimeContext>, name: &str) -> AppResult<String> {
  let containers = ctx.docker.list_containers().await?;
  containers
    .into_iter()
    .find(|c| c.name == name)
    .map(|c| c.id)
    .ok_or_else(|| AppError::not_found(format!("container {name} not found after recreate")))
}

async fn emit(
  ctx: &Arc<RuntimeContext>,
  operation_id: OperationId,
  batch_group_id: Option<BatchGroupId>,
  container: &Container,
  stage: &str,
  percent: u8,
  message: Option<String>,
) {
  ctx
    .events
    .publish(Event::UpdateProgress {
      operation_id,
      batch_group_id,
      container_name: container.name.clone(),
      stack_name: container.stack.clone(),
      stage: stage.to_string(),
      percent,
      message: message.clone(),
      timestamp: Utc::now(),
    })
    .await;
  let _ = ctx
    .store
    .append_update_log(operation_id, Some(&container.name), stage, message.as_deref())
    .await;
  info!(container = %container.name, %stage, "orchestrator progress");
}
