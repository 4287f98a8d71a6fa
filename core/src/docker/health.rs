use std::time::Duration;

use tokio::time::Instant;

use crate::model::HealthStatus;

use super::DockerFacade;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
  /// No healthcheck defined, or one that reported healthy.
  Success,
  Unhealthy,
  Timeout,
}

/// Polls `State.Status` every 2s; once `running`, checks
/// `State.Health.Status`: `none`/`healthy` -> success, `unhealthy` ->
/// failure, `starting` -> keep polling (spec §4.4).
pub async fn wait_for_health(
  docker: &DockerFacade,
  container_id: &str,
  timeout: Duration,
) -> anyhow::Result<HealthOutcome> {
  let deadline = Instant::now() + timeout;

  loop {
    let (running, health) = docker.poll_state(container_id).await?;

    if running {
      match health {
        None | Some(HealthStatus::None) => return Ok(HealthOutcome::Success),
        Some(HealthStatus::Healthy) => return Ok(HealthOutcome::Success),
        Some(HealthStatus::Unhealthy) => {
          return Ok(HealthOutcome::Unhealthy);
        }
        Some(HealthStatus::Starting) => {}
      }
    }

    if Instant::now() >= deadline {
      return Ok(HealthOutcome::Timeout);
    }
    tokio::time::sleep(POLL_INTERVAL).await;
  }
}
