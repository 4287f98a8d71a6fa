//! Thin HTTP handlers (spec §6): deserialize/serialize the documented
//! request/response shapes and call straight into the orchestrator,
//! discovery, and storage APIs. No business logic beyond request
//! validation and envelope formatting lives here.

use std::{collections::HashMap, sync::Arc};

use axum::{
  Json, Router,
  extract::{Path as AxumPath, Query, State},
  routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
  compose::{self, LabelsForm},
  context::RuntimeContext,
  error::{AppError, AppResult, ErrorKind},
  model::{
    BatchGroupId, Container, ImageRef, OperationId, OperationStatus,
    Policy, ScriptAssignment,
  },
  orchestrator::{self, Action, BatchItem, Orchestrator},
  scheduler::Scheduler,
  store::OperationFilter,
};

use super::envelope::Envelope;

#[derive(Clone)]
pub struct AppState {
  pub ctx: Arc<RuntimeContext>,
  pub scheduler: Arc<Scheduler>,
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/api/status", get(status))
    .route("/api/check", get(check))
    .route("/api/trigger-check", post(trigger_check))
    .route("/api/update", post(update))
    .route("/api/update/batch", post(update_batch))
    .route("/api/rollback", post(rollback))
    .route("/api/restart/container/{name}", post(restart_container))
    .route("/api/stop/container/{name}", post(stop_container))
    .route("/api/start/container/{name}", post(start_container))
    .route("/api/fix-mismatch/container/{name}", post(fix_mismatch_container))
    .route("/api/remove/container/{name}", post(remove_container))
    .route("/api/operations", get(list_operations))
    .route("/api/operations/{id}", get(get_operation))
    .route("/api/operations/group/{batch_group_id}", get(operations_for_group))
    .route("/api/history", get(history))
    .route("/api/backups", get(backups))
    .route("/api/labels/set", post(set_label))
    .route("/api/labels/remove", post(remove_label))
    .route("/api/labels/batch", post(batch_labels))
    .route("/api/labels/{container}", get(get_labels))
    .route("/api/scripts", get(list_scripts))
    .route("/api/scripts/assigned", get(list_script_assignments))
    .route("/api/scripts/assign", post(assign_script))
    .route("/api/scripts/assign/{container}", delete(unassign_script))
    .route("/api/registry/tags/{image_ref}", get(registry_tags))
    .route("/api/events", get(super::sse::events_stream))
    .with_state(state)
}

async fn find_container(ctx: &RuntimeContext, name: &str) -> AppResult<Container> {
  ctx
    .docker
    .list_containers()
    .await?
    .into_iter()
    .find(|c| c.name == name)
    .ok_or_else(|| AppError::not_found(format!("container {name} not found")))
}

async fn policy_for(ctx: &RuntimeContext, container: &Container) -> Policy {
  let assignment = ctx.store.script_assignment_for(&container.name).await.ok().flatten();
  Policy::from_labels(&container.labels).merge_assignment(assignment.as_ref())
}

// ---- status / check -------------------------------------------------

#[derive(Serialize)]
struct StatusResponse {
  decisions: Vec<crate::model::UpdateDecision>,
  stacks: HashMap<String, Vec<String>>,
}

async fn stack_grouping(ctx: &RuntimeContext) -> AppResult<HashMap<String, Vec<String>>> {
  let containers = ctx.docker.list_containers().await?;
  let mut stacks: HashMap<String, Vec<String>> = HashMap::new();
  for c in containers {
    if let Some(stack) = c.stack {
      stacks.entry(stack).or_default().push(c.name);
    }
  }
  Ok(stacks)
}

async fn status(
  State(state): State<AppState>,
) -> AppResult<Json<Envelope<StatusResponse>>> {
  let decisions = state.ctx.decisions.get().await;
  let stacks = stack_grouping(&state.ctx).await?;
  Ok(Json(Envelope::ok(StatusResponse { decisions, stacks })))
}

async fn check(
  State(state): State<AppState>,
) -> AppResult<Json<Envelope<StatusResponse>>> {
  state.scheduler.trigger_check().await;
  let decisions = state.ctx.decisions.get().await;
  let stacks = stack_grouping(&state.ctx).await?;
  Ok(Json(Envelope::ok(StatusResponse { decisions, stacks })))
}

#[derive(Serialize)]
struct Accepted {
  accepted: bool,
}

async fn trigger_check(
  State(state): State<AppState>,
) -> Json<Envelope<Accepted>> {
  let scheduler = state.scheduler.clone();
  tokio::spawn(async move { scheduler.trigger_check().await });
  Json(Envelope::ok(Accepted { accepted: true }))
}

// ---- update / rollback / actions -------------------------------------

#[derive(Deserialize)]
struct UpdateRequest {
  container_name: String,
  target_version: String,
  #[serde(default)]
  force: bool,
}

#[derive(Serialize)]
struct OperationIdResponse {
  operation_id: OperationId,
}

async fn update(
  State(state): State<AppState>,
  Json(body): Json<UpdateRequest>,
) -> AppResult<Json<Envelope<OperationIdResponse>>> {
  let container = find_container(&state.ctx, &body.container_name).await?;
  let policy = policy_for(&state.ctx, &container).await;
  let orchestrator = Orchestrator::new(state.ctx.clone());
  let operation_id = orchestrator
    .update_container(container, policy, body.target_version, None, body.force)
    .await?;
  Ok(Json(Envelope::ok(OperationIdResponse { operation_id })))
}

#[derive(Deserialize)]
struct BatchUpdateItem {
  name: String,
  target_version: String,
  #[serde(default)]
  force: bool,
}

#[derive(Deserialize)]
struct BatchUpdateRequest {
  containers: Vec<BatchUpdateItem>,
}

#[derive(Serialize)]
struct BatchUpdateResponse {
  operations: Vec<OperationId>,
  batch_group_id: BatchGroupId,
}

async fn update_batch(
  State(state): State<AppState>,
  Json(body): Json<BatchUpdateRequest>,
) -> AppResult<Json<Envelope<BatchUpdateResponse>>> {
  let mut items = Vec::with_capacity(body.containers.len());
  for item in body.containers {
    let container = find_container(&state.ctx, &item.name).await?;
    let policy = policy_for(&state.ctx, &container).await;
    items.push(BatchItem {
      container,
      policy,
      new_tag: item.target_version,
      force: item.force,
    });
  }

  let batch_group_id = orchestrator::run_batch(&state.ctx, items).await?;
  let operations = state
    .ctx
    .store
    .operations_for_batch_group(batch_group_id)
    .await?
    .into_iter()
    .map(|op| op.operation_id)
    .collect();

  Ok(Json(Envelope::ok(BatchUpdateResponse { operations, batch_group_id })))
}

#[derive(Deserialize)]
struct RollbackRequest {
  operation_id: OperationId,
}

async fn rollback(
  State(state): State<AppState>,
  Json(body): Json<RollbackRequest>,
) -> AppResult<Json<Envelope<OperationIdResponse>>> {
  let operation_id = orchestrator::rollback_operation(&state.ctx, body.operation_id).await?;
  Ok(Json(Envelope::ok(OperationIdResponse { operation_id })))
}

async fn run_action(
  state: AppState,
  name: String,
  action: Action,
) -> AppResult<Json<Envelope<OperationIdResponse>>> {
  let container = find_container(&state.ctx, &name).await?;
  let orchestrator = Orchestrator::new(state.ctx.clone());
  let operation_id = match action {
    Action::Restart => orchestrator.restart_container(container).await?,
    Action::Stop => orchestrator.stop_container(container).await?,
    Action::Start => orchestrator.start_container(container).await?,
    Action::FixMismatch => orchestrator.fix_mismatch(container).await?,
    Action::Remove => orchestrator.remove_container(container).await?,
  };
  Ok(Json(Envelope::ok(OperationIdResponse { operation_id })))
}

async fn restart_container(
  State(state): State<AppState>,
  AxumPath(name): AxumPath<String>,
) -> AppResult<Json<Envelope<OperationIdResponse>>> {
  run_action(state, name, Action::Restart).await
}

async fn stop_container(
  State(state): State<AppState>,
  AxumPath(name): AxumPath<String>,
) -> AppResult<Json<Envelope<OperationIdResponse>>> {
  run_action(state, name, Action::Stop).await
}

async fn start_container(
  State(state): State<AppState>,
  AxumPath(name): AxumPath<String>,
) -> AppResult<Json<Envelope<OperationIdResponse>>> {
  run_action(state, name, Action::Start).await
}

async fn fix_mismatch_container(
  State(state): State<AppState>,
  AxumPath(name): AxumPath<String>,
) -> AppResult<Json<Envelope<OperationIdResponse>>> {
  run_action(state, name, Action::FixMismatch).await
}

async fn remove_container(
  State(state): State<AppState>,
  AxumPath(name): AxumPath<String>,
) -> AppResult<Json<Envelope<OperationIdResponse>>> {
  run_action(state, name, Action::Remove).await
}

// ---- operations / history / backups ----------------------------------

#[derive(Deserialize)]
struct OperationsQuery {
  limit: Option<i64>,
  status: Option<String>,
  container: Option<String>,
  from: Option<DateTime<Utc>>,
  to: Option<DateTime<Utc>>,
}

async fn list_operations(
  State(state): State<AppState>,
  Query(q): Query<OperationsQuery>,
) -> AppResult<Json<Envelope<Vec<crate::model::Operation>>>> {
  let status = q
    .status
    .as_deref()
    .map(parse_operation_status)
    .transpose()?;
  let filter = OperationFilter {
    container_name: q.container,
    status,
    from: q.from,
    to: q.to,
    limit: q.limit.unwrap_or(100),
  };
  let operations = state.ctx.store.list_operations(&filter).await?;
  Ok(Json(Envelope::ok(operations)))
}

fn parse_operation_status(s: &str) -> AppResult<OperationStatus> {
  use std::str::FromStr;
  OperationStatus::from_str(s)
    .map_err(|_| AppError::validation(format!("unknown operation status '{s}'")))
}

async fn get_operation(
  State(state): State<AppState>,
  AxumPath(id): AxumPath<OperationId>,
) -> AppResult<Json<Envelope<crate::model::Operation>>> {
  let operation = state.ctx.store.get_operation(id).await?;
  Ok(Json(Envelope::ok(operation)))
}

async fn operations_for_group(
  State(state): State<AppState>,
  AxumPath(batch_group_id): AxumPath<String>,
) -> AppResult<Json<Envelope<Vec<crate::model::Operation>>>> {
  let id = batch_group_id
    .parse::<uuid::Uuid>()
    .map_err(|e| AppError::validation(format!("invalid batch group id: {e}")))?;
  let operations =
    state.ctx.store.operations_for_batch_group(BatchGroupId(id)).await?;
  Ok(Json(Envelope::ok(operations)))
}

#[derive(Deserialize)]
struct LimitQuery {
  limit: Option<i64>,
}

async fn history(
  State(state): State<AppState>,
  Query(q): Query<LimitQuery>,
) -> AppResult<Json<Envelope<Vec<crate::model::CheckHistoryEntry>>>> {
  let entries = state.ctx.store.recent_check_history(q.limit.unwrap_or(100)).await?;
  Ok(Json(Envelope::ok(entries)))
}

async fn backups(
  State(state): State<AppState>,
) -> AppResult<Json<Envelope<Vec<crate::model::ComposeBackup>>>> {
  let backups = state.ctx.store.list_compose_backups().await?;
  Ok(Json(Envelope::ok(backups)))
}

// ---- labels -----------------------------------------------------------

#[derive(Deserialize)]
struct SetLabelRequest {
  container_name: String,
  key: String,
  value: String,
}

#[derive(Deserialize)]
struct RemoveLabelRequest {
  container_name: String,
  key: String,
}

#[derive(Deserialize)]
struct BatchLabelsRequest {
  container_name: String,
  labels: IndexMap<String, String>,
}

#[derive(Serialize)]
struct LabelsResponse {
  labels: IndexMap<String, String>,
}

fn apply_label_edit(
  target: &crate::orchestrator::compose_target::ComposeTarget,
  edit: impl FnOnce(&mut IndexMap<String, String>),
) -> AppResult<IndexMap<String, String>> {
  let (form, mut labels, header_idx, end_idx) =
    compose::read_labels(&target.doc.source, &target.location)
      .unwrap_or((LabelsForm::Mapping, IndexMap::new(), target.location.body_start, target.location.body_start));

  edit(&mut labels);

  let new_source =
    compose::write_labels(&target.doc.source, &target.location, form, &labels, header_idx, end_idx);
  std::fs::write(&target.doc.path, new_source)
    .map_err(|e| AppError::new(ErrorKind::ComposeParseError, anyhow::Error::new(e)))?;
  Ok(labels)
}

async fn get_labels(
  State(state): State<AppState>,
  AxumPath(container_name): AxumPath<String>,
) -> AppResult<Json<Envelope<LabelsResponse>>> {
  let container = find_container(&state.ctx, &container_name).await?;
  let target = orchestrator::compose_target::resolve(&container)?;
  let labels = compose::read_labels(&target.doc.source, &target.location)
    .map(|(_, labels, _, _)| labels)
    .unwrap_or_default();
  Ok(Json(Envelope::ok(LabelsResponse { labels })))
}

async fn set_label(
  State(state): State<AppState>,
  Json(body): Json<SetLabelRequest>,
) -> AppResult<Json<Envelope<LabelsResponse>>> {
  let container = find_container(&state.ctx, &body.container_name).await?;
  let target = orchestrator::compose_target::resolve(&container)?;
  let labels = apply_label_edit(&target, |labels| {
    labels.insert(body.key.clone(), body.value.clone());
  })?;
  Ok(Json(Envelope::ok(LabelsResponse { labels })))
}

async fn remove_label(
  State(state): State<AppState>,
  Json(body): Json<RemoveLabelRequest>,
) -> AppResult<Json<Envelope<LabelsResponse>>> {
  let container = find_container(&state.ctx, &body.container_name).await?;
  let target = orchestrator::compose_target::resolve(&container)?;
  let labels = apply_label_edit(&target, |labels| {
    labels.shift_remove(&body.key);
  })?;
  Ok(Json(Envelope::ok(LabelsResponse { labels })))
}

async fn batch_labels(
  State(state): State<AppState>,
  Json(body): Json<BatchLabelsRequest>,
) -> AppResult<Json<Envelope<LabelsResponse>>> {
  let container = find_container(&state.ctx, &body.container_name).await?;
  let target = orchestrator::compose_target::resolve(&container)?;
  let labels = apply_label_edit(&target, |labels| {
    for (k, v) in body.labels {
      labels.insert(k, v);
    }
  })?;
  Ok(Json(Envelope::ok(LabelsResponse { labels })))
}

// ---- scripts ------------------------------------------------------------

async fn list_scripts(
  State(state): State<AppState>,
) -> Json<Envelope<Vec<String>>> {
  Json(Envelope::ok(state.ctx.scripts.list()))
}

async fn list_script_assignments(
  State(state): State<AppState>,
) -> AppResult<Json<Envelope<Vec<ScriptAssignment>>>> {
  let assignments = state.ctx.store.list_script_assignments().await?;
  Ok(Json(Envelope::ok(assignments)))
}

#[derive(Deserialize)]
struct AssignScriptRequest {
  container_name: String,
  script_path: String,
  #[serde(default)]
  enabled: bool,
  #[serde(default)]
  ignore: bool,
  #[serde(default)]
  allow_latest: bool,
  assigned_by: String,
}

async fn assign_script(
  State(state): State<AppState>,
  Json(body): Json<AssignScriptRequest>,
) -> AppResult<Json<Envelope<ScriptAssignment>>> {
  if !state.ctx.scripts.contains(&body.script_path) {
    return Err(AppError::validation(format!(
      "script path '{}' escapes the scripts directory",
      body.script_path
    )));
  }

  let now = Utc::now();
  let assignment = ScriptAssignment {
    container_name: body.container_name,
    script_path: body.script_path,
    enabled: body.enabled,
    ignore: body.ignore,
    allow_latest: body.allow_latest,
    assigned_at: now,
    assigned_by: body.assigned_by,
    updated_at: now,
  };
  state.ctx.store.upsert_script_assignment(&assignment).await?;
  Ok(Json(Envelope::ok(assignment)))
}

async fn unassign_script(
  State(state): State<AppState>,
  AxumPath(container_name): AxumPath<String>,
) -> AppResult<Json<Envelope<Accepted>>> {
  state.ctx.store.remove_script_assignment(&container_name).await?;
  Ok(Json(Envelope::ok(Accepted { accepted: true })))
}

// ---- registry -----------------------------------------------------------

#[derive(Serialize)]
struct TagsResponse {
  tags: Vec<String>,
  not_found: bool,
}

async fn registry_tags(
  State(state): State<AppState>,
  AxumPath(encoded_image_ref): AxumPath<String>,
) -> AppResult<Json<Envelope<TagsResponse>>> {
  let decoded = urlencoding_decode(&encoded_image_ref);
  let image_ref = ImageRef::parse(&decoded);
  let tags = state.ctx.registry.list_tags(&image_ref).await?;
  Ok(Json(Envelope::ok(TagsResponse { tags: tags.tags, not_found: tags.not_found })))
}

/// Minimal percent-decoding for the one path segment that needs it - full
/// image references contain `/` and `:`, which axum's path extractor
/// leaves percent-encoded.
fn urlencoding_decode(s: &str) -> String {
  let bytes = s.as_bytes();
  let mut out = Vec::with_capacity(bytes.len());
  let mut i = 0;
  while i < bytes.len() {
    if bytes[i] == b'%' && i + 2 < bytes.len() {
      if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
        out.push(byte);
        i += 3;
        continue;
      }
    }
    out.push(bytes[i]);
    i += 1;
  }
  String::from_utf8_lossy(&out).into_owned()
}
