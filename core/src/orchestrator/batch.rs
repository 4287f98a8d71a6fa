//! Batch update (spec §4.9's "Batch" paragraph): one `batchGroupId` shared
//! across N containers. Per-stack serialization and cross-stack
//! parallelism fall out of [`Orchestrator::update_container`] for free -
//! it already spawns a detached task per container and acquires the
//! stack lock inside that task, so this module only needs to insert one
//! operation per item and let them race.

use std::sync::Arc;

use crate::{
  context::RuntimeContext,
  error::AppResult,
  model::{BatchDetail, BatchGroupId, Container, OperationStatus, Policy},
};

use super::Orchestrator;

pub struct BatchItem {
  pub container: Container,
  pub policy: Policy,
  pub new_tag: String,
  pub force: bool,
}

/// Starts every item under a single batch group id, returning as soon as
/// all of them are enqueued (not when they finish). A per-item
/// `BatchDetail` row is recorded immediately so `GET
/// /api/operations/group/{id}` can show `pending` rows before any stage
/// has run; the orchestrator's own progress machinery mutates them
/// further as each item's operation advances.
pub async fn run_batch(
  ctx: &Arc<RuntimeContext>,
  items: Vec<BatchItem>,
) -> AppResult<BatchGroupId> {
  let batch_group_id = BatchGroupId::new();
  let orchestrator = Orchestrator::new(ctx.clone());

  for item in items {
    let old_version = item.container.image_ref.tag.clone();
    let container_name = item.container.name.clone();
    let new_tag = item.new_tag.clone();

    let operation_id = orchestrator
      .update_container(
        item.container,
        item.policy,
        item.new_tag,
        Some(batch_group_id),
        item.force,
      )
      .await?;

    ctx
      .store
      .upsert_batch_detail(&BatchDetail {
        operation_id,
        container_name,
        status: OperationStatus::Pending,
        old_version,
        new_version: Some(new_tag),
        message: None,
      })
      .await?;
  }

  Ok(batch_group_id)
}
