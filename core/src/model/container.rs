use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::image_ref::ImageRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
  Running,
  Exited,
  Paused,
  Restarting,
  Dead,
  Created,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
  None,
  Starting,
  Healthy,
  Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountInfo {
  pub source: String,
  pub destination: String,
  pub read_only: bool,
}

/// Container record per spec §3. `stack` / `service` come from the
/// `com.docker.compose.{project,service}` labels; `compose_labels` is the
/// subset authored in the compose file, reconciled by the compose engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
  pub id: String,
  pub name: String,
  pub image: String,
  pub image_ref: ImageRef,
  pub labels: HashMap<String, String>,
  pub compose_labels: HashMap<String, String>,
  pub state: ContainerState,
  pub health: Option<HealthStatus>,
  pub stack: Option<String>,
  pub service: Option<String>,
  pub created_at: chrono::DateTime<chrono::Utc>,
  pub networks: Vec<String>,
  pub mounts: Vec<MountInfo>,
}

impl Container {
  pub const STACK_LABEL: &'static str = "com.docker.compose.project";
  pub const SERVICE_LABEL: &'static str = "com.docker.compose.service";
  pub const CONFIG_FILES_LABEL: &'static str =
    "com.docker.compose.project.config_files";
  pub const WORKING_DIR_LABEL: &'static str =
    "com.docker.compose.project.working_dir";

  pub fn from_labels(
    id: String,
    name: String,
    image: String,
    labels: HashMap<String, String>,
    state: ContainerState,
    health: Option<HealthStatus>,
    created_at: chrono::DateTime<chrono::Utc>,
    networks: Vec<String>,
    mounts: Vec<MountInfo>,
  ) -> Self {
    let image_ref = ImageRef::parse(&image);
    let stack = labels.get(Self::STACK_LABEL).cloned();
    let service = labels.get(Self::SERVICE_LABEL).cloned();
    Container {
      id,
      name,
      image,
      image_ref,
      compose_labels: labels
        .iter()
        .filter(|(k, _)| k.starts_with("com.docker.compose."))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect(),
      labels,
      state,
      health,
      stack,
      service,
      created_at,
      networks,
      mounts,
    }
  }

  pub fn compose_file_paths(&self) -> Vec<String> {
    self
      .labels
      .get(Self::CONFIG_FILES_LABEL)
      .map(|v| v.split(',').map(str::to_string).collect())
      .unwrap_or_default()
  }

  pub fn working_dir(&self) -> Option<&str> {
    self.labels.get(Self::WORKING_DIR_LABEL).map(String::as_str)
  }
}
