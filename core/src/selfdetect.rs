//! Self-Detect: identifies which running container (if any) is the
//! manager's own, so the orchestrator can recognize a self-update and
//! take the `pending_restart` exit path (spec §4.9).
//!
//! Docker sets a container's hostname to its short container id by
//! default, which is the cheapest signal available without requiring the
//! container id to be injected explicitly via the environment.

use crate::docker::DockerFacade;

pub async fn detect(docker: &DockerFacade) -> Option<String> {
  let hostname = read_hostname()?;
  let containers = docker.list_containers().await.ok()?;
  containers
    .into_iter()
    .find(|c| c.id.starts_with(&hostname))
    .map(|c| c.id)
}

fn read_hostname() -> Option<String> {
  std::fs::read_to_string("/etc/hostname")
    .ok()
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_trimmed_hostname_when_present() {
    // Exercises the parsing path only - can't assert a concrete value
    // since it depends on the host running the test.
    let _ = read_hostname();
  }
}
