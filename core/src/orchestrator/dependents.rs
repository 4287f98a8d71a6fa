//! Dependent restarts (spec §4.9's `restarting_dependents` stage): after a
//! container updates, anything naming it in `docksmith.restart-after` gets
//! restarted, unless its own pre-check fails - in which case it's skipped
//! (`blocked`), not marked as a failed operation of its own.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::{
  context::RuntimeContext,
  depgraph::DependencyGraph,
  error::AppResult,
  eventbus::Event,
  model::{BatchGroupId, Container, OperationId, Policy},
};

use super::actions::{Action, run_action};

pub async fn restart_dependents(
  ctx: &Arc<RuntimeContext>,
  updated: &Container,
  triggering_operation: OperationId,
  batch_group_id: Option<BatchGroupId>,
) -> AppResult<()> {
  let containers = ctx.docker.list_containers().await?;

  let mut graph = DependencyGraph::new();
  for c in &containers {
    let policy = Policy::from_labels(&c.labels);
    graph.add_node(&c.name);
    for dep in &policy.restart_after {
      graph.add_edge(&c.name, dep);
    }
  }

  if let Err(cycle) = graph.topological_order() {
    warn!(error = %cycle, "restart-after graph has a cycle, skipping dependent restarts");
    return Ok(());
  }

  for name in graph.dependents_of(&updated.name) {
    let Some(dependent) = containers.iter().find(|c| c.name == name) else {
      continue;
    };

    let assignment = ctx.store.script_assignment_for(&name).await.ok().flatten();
    let policy =
      Policy::from_labels(&dependent.labels).merge_assignment(assignment.as_ref());

    if policy.ignore {
      continue;
    }

    if let Some(script) = &policy.pre_update_check {
      if let Err(e) = ctx.scripts.run_precheck(script, &name).await {
        ctx
          .events
          .publish(Event::UpdateProgress {
            operation_id: triggering_operation,
            batch_group_id,
            container_name: name.clone(),
            stack_name: dependent.stack.clone(),
            stage: "blocked".to_string(),
            percent: 100,
            message: Some(format!(
              "pre-update check failed, dependent restart skipped: {e}"
            )),
            timestamp: Utc::now(),
          })
          .await;
        let _ = ctx
          .store
          .append_update_log(
            triggering_operation,
            Some(&name),
            "blocked",
            Some(&e.to_string()),
          )
          .await;
        continue;
      }
    }

    let _ = run_action(ctx, dependent.clone(), Action::Restart).await;
  }

  Ok(())
}
