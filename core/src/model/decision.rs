use serde::{Deserialize, Serialize};

use crate::version::{ChangeType, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
  UpdateAvailable,
  UpToDate,
  LocalImage,
  MetadataUnavailable,
  CheckFailed,
}

/// Per-container conclusion of the checker (spec §3/§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDecision {
  pub container_name: String,
  pub status: DecisionStatus,
  pub current_version: Option<Version>,
  pub latest_version: Option<String>,
  pub latest_resolved_version: Option<Version>,
  pub recommended_tag: Option<String>,
  pub change_type: Option<ChangeType>,
  pub error: Option<String>,
  /// Advisory set when the current tag is an unversioned opaque tag
  /// (`latest`, `stable`) and `allow-latest` is off (spec §4.6 step 2).
  pub using_latest_tag: bool,
}

impl UpdateDecision {
  pub fn up_to_date(container_name: String) -> Self {
    Self {
      container_name,
      status: DecisionStatus::UpToDate,
      current_version: None,
      latest_version: None,
      latest_resolved_version: None,
      recommended_tag: None,
      change_type: None,
      error: None,
      using_latest_tag: false,
    }
  }

  pub fn failed(container_name: String, error: String) -> Self {
    Self {
      container_name,
      status: DecisionStatus::CheckFailed,
      current_version: None,
      latest_version: None,
      latest_resolved_version: None,
      recommended_tag: None,
      change_type: None,
      error: Some(error),
      using_latest_tag: false,
    }
  }

  /// Degraded outcome for transient upstream failures (spec §7:
  /// `Unavailable`/`Timeout` from the registry layer degrade the
  /// container rather than failing the whole scan).
  pub fn metadata_unavailable(container_name: String, error: String) -> Self {
    Self {
      container_name,
      status: DecisionStatus::MetadataUnavailable,
      current_version: None,
      latest_version: None,
      latest_resolved_version: None,
      recommended_tag: None,
      change_type: None,
      error: Some(error),
      using_latest_tag: false,
    }
  }

  pub fn local_image(container_name: String) -> Self {
    Self {
      container_name,
      status: DecisionStatus::LocalImage,
      current_version: None,
      latest_version: None,
      latest_resolved_version: None,
      recommended_tag: None,
      change_type: None,
      error: None,
      using_latest_tag: false,
    }
  }
}
