use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parallel encoding of a container's update policy, alongside labels
/// (spec §3). The orchestrator reads assignments first, falling back to
/// labels when no assignment exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptAssignment {
  pub container_name: String,
  pub script_path: String,
  pub enabled: bool,
  pub ignore: bool,
  pub allow_latest: bool,
  pub assigned_at: DateTime<Utc>,
  pub assigned_by: String,
  pub updated_at: DateTime<Utc>,
}
