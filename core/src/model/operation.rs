use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OperationId(pub Uuid);

impl OperationId {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }
}

impl Default for OperationId {
  fn default() -> Self {
    Self::new()
  }
}

impl std::fmt::Display for OperationId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl std::str::FromStr for OperationId {
  type Err = uuid::Error;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Self(Uuid::parse_str(s)?))
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BatchGroupId(pub Uuid);

impl BatchGroupId {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }
}

impl Default for BatchGroupId {
  fn default() -> Self {
    Self::new()
  }
}

impl std::fmt::Display for BatchGroupId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationType {
  Single,
  Batch,
  Rollback,
  Restart,
  Stop,
  Start,
  Remove,
  FixMismatch,
  LabelChange,
  BatchUpdate,
  BatchRestart,
  BatchStop,
  BatchStart,
  BatchRemove,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationStatus {
  Pending,
  InProgress,
  PendingRestart,
  Complete,
  Failed,
}

impl OperationStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, OperationStatus::Complete | OperationStatus::Failed)
  }

  /// Status transitions are write-only and monotonic (spec §4.8). Returns
  /// whether `self -> next` is a legal forward transition.
  pub fn can_transition_to(self, next: OperationStatus) -> bool {
    use OperationStatus::*;
    if self == next {
      return true;
    }
    matches!(
      (self, next),
      (Pending, InProgress)
        | (Pending, Failed)
        | (InProgress, PendingRestart)
        | (InProgress, Complete)
        | (InProgress, Failed)
        | (PendingRestart, Complete)
        | (PendingRestart, Failed)
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDetail {
  pub operation_id: OperationId,
  pub container_name: String,
  pub status: OperationStatus,
  pub old_version: Option<String>,
  pub new_version: Option<String>,
  pub message: Option<String>,
}

/// Durable operation record (spec §3). Invariants enforced by the
/// operation store, not by this type alone: `started_at <= completed_at`;
/// terminal status implies `completed_at` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
  pub operation_id: OperationId,
  pub batch_group_id: Option<BatchGroupId>,
  pub container_name: Option<String>,
  pub stack_name: Option<String>,
  pub op_type: OperationType,
  pub status: OperationStatus,
  pub old_version: Option<String>,
  pub new_version: Option<String>,
  pub error_message: Option<String>,
  pub created_at: DateTime<Utc>,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
  pub batch_details: Vec<BatchDetail>,
}

impl Operation {
  pub fn new(
    op_type: OperationType,
    container_name: Option<String>,
    stack_name: Option<String>,
    batch_group_id: Option<BatchGroupId>,
  ) -> Self {
    Operation {
      operation_id: OperationId::new(),
      batch_group_id,
      container_name,
      stack_name,
      op_type,
      status: OperationStatus::Pending,
      old_version: None,
      new_version: None,
      error_message: None,
      created_at: Utc::now(),
      started_at: None,
      completed_at: None,
      batch_details: Vec::new(),
    }
  }
}
