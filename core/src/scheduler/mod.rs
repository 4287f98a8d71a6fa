//! Scheduler (spec §4.10): two independent periodic tasks - discovery at
//! `CHECK_INTERVAL` and a registry response-cache sweep at `CACHE_TTL /
//! 2` - plus a debounced manual trigger so a `POST /api/trigger-check`
//! racing a scheduled tick runs the sweep once, not twice. The SSE
//! keepalive is per-connection (`api::sse`), not scheduled here, since
//! its `dropped` count is meaningful only per subscriber.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::{
  context::RuntimeContext,
  discovery::Checker,
  model::{Container, Policy},
};

pub struct Scheduler {
  ctx: Arc<RuntimeContext>,
  /// Set while a discovery sweep is running, so a concurrent manual
  /// trigger can fold into it instead of starting a second pass.
  check_in_flight: AtomicBool,
  check_done: Notify,
}

impl Scheduler {
  pub fn new(ctx: Arc<RuntimeContext>) -> Arc<Self> {
    Arc::new(Scheduler {
      ctx,
      check_in_flight: AtomicBool::new(false),
      check_done: Notify::new(),
    })
  }

  /// Spawns the three periodic loops. Returns immediately; the loops run
  /// for the lifetime of the process.
  pub fn spawn(self: &Arc<Self>) {
    let check_scheduler = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(check_scheduler.ctx.config.check_interval());
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        check_scheduler.trigger_check().await;
      }
    });

    let sweep_ctx = self.ctx.clone();
    tokio::spawn(async move {
      let mut ticker =
        tokio::time::interval(sweep_ctx.config.cache_sweep_interval());
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let swept = sweep_ctx.registry.sweep_expired_cache().await;
        if swept > 0 {
          info!(swept, "registry response cache sweep");
        }
      }
    });
  }

  /// Runs a discovery sweep, or waits for one already in flight to
  /// finish - the debounce named in spec §4.10.
  pub async fn trigger_check(self: &Arc<Self>) {
    if self.check_in_flight.swap(true, Ordering::AcqRel) {
      self.check_done.notified().await;
      return;
    }

    let result = self.run_check_cycle().await;
    if let Err(e) = result {
      warn!(error = %e, "discovery sweep failed");
    }

    self.check_in_flight.store(false, Ordering::Release);
    self.check_done.notify_waiters();
  }

  async fn run_check_cycle(&self) -> anyhow::Result<()> {
    let containers = self.ctx.docker.list_containers().await?;
    let mut with_policy = Vec::with_capacity(containers.len());
    for container in containers {
      with_policy.push((container.clone(), policy_for(&self.ctx, &container).await));
    }

    let checker =
      Checker::new(self.ctx.registry.clone(), self.ctx.docker.clone(), self.ctx.store.clone());
    let results = checker
      .run(&with_policy, self.ctx.config.discovery_fan_out, &self.ctx.events)
      .await;

    let mut decisions = Vec::with_capacity(results.len());
    for (decision, history) in results {
      if let Err(e) = self.ctx.store.append_check_history(&history).await {
        warn!(container = %history.container_name, error = %e, "failed to persist check history");
      }
      decisions.push(decision);
    }
    self.ctx.decisions.set(decisions).await;

    info!(checked = with_policy.len(), at = %Utc::now(), "discovery sweep complete");
    Ok(())
  }
}

async fn policy_for(ctx: &Arc<RuntimeContext>, container: &Container) -> Policy {
  let assignment = ctx.store.script_assignment_for(&container.name).await.ok().flatten();
  Policy::from_labels(&container.labels).merge_assignment(assignment.as_ref())
}
