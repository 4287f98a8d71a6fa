use std::{path::Path, time::Duration};

use anyhow::Context;
use bollard::{
  Docker,
  query_parameters::{
    InspectContainerOptions, ListContainersOptionsBuilder,
    RemoveContainerOptionsBuilder,
  },
};
use chrono::{DateTime, Utc};
use command::{CommandOutput, run_command_with_timeout};

use crate::model::{Container, ContainerState, HealthStatus, MountInfo};

/// Timeout for a single `docker compose` recreate invocation (spec §5).
pub const COMPOSE_RECREATE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Timeout for a `docker pull` (spec §5).
pub const PULL_TIMEOUT: Duration = Duration::from_secs(10 * 60);

pub struct DockerFacade {
  docker: Docker,
  /// Set when `docker compose` (the v2 plugin) isn't on the host and the
  /// standalone `docker-compose` binary must be used instead.
  legacy_compose: bool,
}

impl DockerFacade {
  pub fn connect(legacy_compose: bool) -> anyhow::Result<Self> {
    let docker = Docker::connect_with_local_defaults()
      .context("failed to connect to the docker daemon")?;
    Ok(DockerFacade { docker, legacy_compose })
  }

  fn compose_program(&self) -> (&'static str, Vec<String>) {
    if self.legacy_compose {
      ("docker-compose", vec![])
    } else {
      ("docker", vec!["compose".to_string()])
    }
  }

  /// Enumerates running/stopped containers with labels, state, health.
  pub async fn list_containers(
    &self,
  ) -> anyhow::Result<Vec<Container>> {
    let summaries = self
      .docker
      .list_containers(Some(
        ListContainersOptionsBuilder::new().all(true).build(),
      ))
      .await
      .context("failed to list containers")?;

    let mut containers = Vec::with_capacity(summaries.len());
    for summary in summaries {
      let Some(id) = summary.id.clone() else { continue };
      let name = summary
        .names
        .as_ref()
        .and_then(|n| n.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.clone());
      let image = summary.image.clone().unwrap_or_default();
      let labels = summary.labels.clone().unwrap_or_default();
      let state = parse_state(summary.state.as_deref());
      let health = self.container_health(&id).await;
      let created_at = summary
        .created
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);
      let networks = summary
        .network_settings
        .as_ref()
        .and_then(|ns| ns.networks.as_ref())
        .map(|n| n.keys().cloned().collect())
        .unwrap_or_default();
      let mounts = summary
        .mounts
        .unwrap_or_default()
        .into_iter()
        .map(|m| MountInfo {
          source: m.source.unwrap_or_default(),
          destination: m.destination.unwrap_or_default(),
          read_only: !m.rw.unwrap_or(true),
        })
        .collect();

      containers.push(Container::from_labels(
        id, name, image, labels, state, health, created_at, networks,
        mounts,
      ));
    }
    Ok(containers)
  }

  async fn container_health(&self, id: &str) -> Option<HealthStatus> {
    let detail = self
      .docker
      .inspect_container(id, None::<InspectContainerOptions>)
      .await
      .ok()?;
    let health = detail.state?.health?;
    Some(match health.status {
      Some(bollard::models::HealthStatusEnum::HEALTHY) => {
        HealthStatus::Healthy
      }
      Some(bollard::models::HealthStatusEnum::UNHEALTHY) => {
        HealthStatus::Unhealthy
      }
      Some(bollard::models::HealthStatusEnum::STARTING) => {
        HealthStatus::Starting
      }
      _ => HealthStatus::None,
    })
  }

  /// Returns `(running, health)` for the health-wait loop.
  pub async fn poll_state(
    &self,
    container_id: &str,
  ) -> anyhow::Result<(bool, Option<HealthStatus>)> {
    let detail = self
      .docker
      .inspect_container(
        container_id,
        None::<InspectContainerOptions>,
      )
      .await
      .context("failed to inspect container")?;
    let state = detail.state.unwrap_or_default();
    let running = state.running.unwrap_or(false);
    let health = state.health.and_then(|h| {
      Some(match h.status? {
        bollard::models::HealthStatusEnum::HEALTHY => {
          HealthStatus::Healthy
        }
        bollard::models::HealthStatusEnum::UNHEALTHY => {
          HealthStatus::Unhealthy
        }
        bollard::models::HealthStatusEnum::STARTING => {
          HealthStatus::Starting
        }
        _ => HealthStatus::None,
      })
    });
    Ok((running, health))
  }

  /// Image digest + labels, as reported by the daemon for the currently
  /// running container's image (used to short-circuit via the version
  /// cache - spec §4.6 step 3).
  pub async fn image_digest(
    &self,
    image: &str,
  ) -> anyhow::Result<Option<String>> {
    let inspect = self
      .docker
      .inspect_image(image)
      .await
      .context("failed to inspect image")?;
    Ok(
      inspect
        .repo_digests
        .unwrap_or_default()
        .into_iter()
        .find_map(|d| d.split_once('@').map(|(_, digest)| digest.to_string())),
    )
  }

  /// `docker pull <image>` with streaming progress captured as combined
  /// output (grounded on the teacher's periphery `pull_image`, which
  /// shells the same command rather than using bollard's image-create
  /// stream).
  pub async fn pull_image(&self, image: &str) -> CommandOutput {
    run_command_with_timeout(
      "docker",
      &["pull".to_string(), image.to_string()],
      None,
      &[],
      PULL_TIMEOUT,
    )
    .await
  }

  /// `compose up -d --force-recreate --no-deps <service>` scoped to the
  /// stack's project directory and compose file (spec §4.4).
  pub async fn compose_up(
    &self,
    host_project_dir: &Path,
    compose_file: &Path,
    service: &str,
  ) -> CommandOutput {
    let (program, mut args) = self.compose_program();
    args.extend([
      "--project-directory".to_string(),
      host_project_dir.to_string_lossy().to_string(),
      "-f".to_string(),
      compose_file.to_string_lossy().to_string(),
      "up".to_string(),
      "-d".to_string(),
      "--force-recreate".to_string(),
      "--no-deps".to_string(),
      service.to_string(),
    ]);
    run_command_with_timeout(
      program,
      &args,
      None,
      &[],
      COMPOSE_RECREATE_TIMEOUT,
    )
    .await
  }

  async fn compose_subcommand(
    &self,
    host_project_dir: &Path,
    compose_file: &Path,
    sub: &str,
    service: &str,
  ) -> CommandOutput {
    let (program, mut args) = self.compose_program();
    args.extend([
      "--project-directory".to_string(),
      host_project_dir.to_string_lossy().to_string(),
      "-f".to_string(),
      compose_file.to_string_lossy().to_string(),
      sub.to_string(),
      service.to_string(),
    ]);
    run_command_with_timeout(
      program,
      &args,
      None,
      &[],
      COMPOSE_RECREATE_TIMEOUT,
    )
    .await
  }

  pub async fn compose_restart(
    &self,
    host_project_dir: &Path,
    compose_file: &Path,
    service: &str,
  ) -> CommandOutput {
    self
      .compose_subcommand(host_project_dir, compose_file, "restart", service)
      .await
  }

  pub async fn compose_stop(
    &self,
    host_project_dir: &Path,
    compose_file: &Path,
    service: &str,
  ) -> CommandOutput {
    self
      .compose_subcommand(host_project_dir, compose_file, "stop", service)
      .await
  }

  pub async fn compose_start(
    &self,
    host_project_dir: &Path,
    compose_file: &Path,
    service: &str,
  ) -> CommandOutput {
    self
      .compose_subcommand(host_project_dir, compose_file, "start", service)
      .await
  }

  /// Force-removes a container by id (spec §4.9's `remove` action type).
  pub async fn remove_container(&self, id: &str) -> anyhow::Result<()> {
    self
      .docker
      .remove_container(
        id,
        Some(RemoveContainerOptionsBuilder::new().force(true).build()),
      )
      .await
      .context("failed to remove container")?;
    Ok(())
  }

  /// Creates a symlink from the host-visible compose path to the
  /// in-manager path, scoped to the directory, so the daemon's relative
  /// `env_file:` resolution succeeds when the two differ (spec §4.4).
  /// Pre-existing paths are never overwritten.
  pub fn ensure_host_path_symlink(
    &self,
    host_path: &Path,
    in_manager_path: &Path,
  ) -> anyhow::Result<()> {
    if host_path == in_manager_path || host_path.exists() {
      return Ok(());
    }
    if let Some(parent) = host_path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(in_manager_path, host_path)?;
    Ok(())
  }
}

fn parse_state(state: Option<&str>) -> ContainerState {
  match state {
    Some("running") => ContainerState::Running,
    Some("paused") => ContainerState::Paused,
    Some("restarting") => ContainerState::Restarting,
    Some("dead") => ContainerState::Dead,
    Some("created") => ContainerState::Created,
    _ => ContainerState::Exited,
  }
}

pub trait CommandOutputExt {
  fn into_result(self) -> anyhow::Result<()>;
}

impl CommandOutputExt for CommandOutput {
  fn into_result(self) -> anyhow::Result<()> {
    if self.success() {
      Ok(())
    } else {
      anyhow::bail!("{}", self.stderr.trim())
    }
  }
}
