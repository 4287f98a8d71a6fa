use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{BatchGroupId, DecisionStatus, OperationId, OperationStatus};

/// Typed payloads broadcast on the event bus (spec §4.7), serialized
/// as SSE `event: <kind>` / `data: <json>` pairs by the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
  /// Progress within a single update/rollback/restart operation (spec
  /// §4.9: "(operationId, containerName, stackName, stage, percent,
  /// message)").
  UpdateProgress {
    operation_id: OperationId,
    batch_group_id: Option<BatchGroupId>,
    container_name: String,
    stack_name: Option<String>,
    stage: String,
    percent: u8,
    message: Option<String>,
    timestamp: DateTime<Utc>,
  },
  /// A container finished transitioning (terminal operation state).
  ContainerUpdated {
    container_name: String,
    status: OperationStatus,
    old_version: Option<String>,
    new_version: Option<String>,
    timestamp: DateTime<Utc>,
  },
  /// Progress within a discovery/check sweep.
  CheckProgress {
    container_name: String,
    status: DecisionStatus,
    checked: usize,
    total: usize,
    timestamp: DateTime<Utc>,
  },
  /// Idle heartbeat so SSE clients and intermediaries don't time the
  /// connection out; carries the subscriber's own drop count so far.
  Keepalive { dropped: u64, timestamp: DateTime<Utc> },
}

impl Event {
  pub fn keepalive(dropped: u64) -> Self {
    Event::Keepalive { dropped, timestamp: Utc::now() }
  }

  /// The SSE `event:` field name for this payload.
  pub fn kind(&self) -> &'static str {
    match self {
      Event::UpdateProgress { .. } => "update.progress",
      Event::ContainerUpdated { .. } => "container.updated",
      Event::CheckProgress { .. } => "check.progress",
      Event::Keepalive { .. } => "keepalive",
    }
  }
}
