use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named in spec §6's table; not detailed in §3 - a point-in-time
/// snapshot of process configuration, taken for audit/rollback-of-config
/// purposes distinct from compose rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
  pub id: i64,
  pub taken_at: DateTime<Utc>,
  pub reason: String,
  pub payload: serde_json::Value,
}

/// Per-container override of the default auto-rollback behavior,
/// complementing the `docksmith.auto_rollback` label with a
/// database-editable form (spec §6's `rollback_policies` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackPolicy {
  pub container_name: String,
  pub auto_rollback: bool,
  pub health_check_timeout_secs: u64,
}
