use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::DecisionStatus;

/// Durable record of one discovery pass' conclusion for a container
/// (spec §4.6 step 7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckHistoryEntry {
  pub container_name: String,
  pub stack_name: Option<String>,
  pub status: DecisionStatus,
  pub current_version: Option<String>,
  pub latest_version: Option<String>,
  pub checked_at: DateTime<Utc>,
  pub error: Option<String>,
}
