//! Discovery & Checker (spec §4.6): joins the live container inventory
//! with policy and the registry's tag set to produce an [`UpdateDecision`]
//! per container, with a bounded-fan-out worker pool.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::{
  docker::DockerFacade,
  error::{AppResult, ErrorKind},
  eventbus::{Event, EventBus},
  model::{
    CheckHistoryEntry, Container, DecisionStatus, Policy, UpdateDecision,
  },
  registry::RegistryPool,
  version::{TagInfo, get_change_type, is_newer, parse_image_tag, select_candidate},
};

/// Opaque tags treated as "rolling" - compared by digest, never by a
/// selected candidate tag (spec §4.6 step 2).
const LATEST_LIKE_TAGS: &[&str] = &["latest", "stable"];

/// Looks up and records the digest-keyed resolved-version cache (spec
/// §4.6 step 3). Implemented by the operation store; kept as a trait here
/// so discovery doesn't depend on storage internals.
#[async_trait::async_trait]
pub trait VersionCacheLookup: Send + Sync {
  async fn get(&self, sha256: &str) -> Option<String>;
  async fn put(&self, sha256: &str, image_ref: &str, version: &str);
}

pub struct Checker {
  registry: Arc<RegistryPool>,
  docker: Arc<DockerFacade>,
  cache: Arc<dyn VersionCacheLookup>,
}

impl Checker {
  pub fn new(
    registry: Arc<RegistryPool>,
    docker: Arc<DockerFacade>,
    cache: Arc<dyn VersionCacheLookup>,
  ) -> Self {
    Checker { registry, docker, cache }
  }

  /// Runs the discovery pass over `containers` with the configured
  /// fan-out, publishing `check.progress` events, and returns results in
  /// stack order (stack name, falling back to container name, ascending).
  pub async fn run(
    &self,
    containers: &[(Container, Policy)],
    fan_out: usize,
    events: &EventBus,
  ) -> Vec<(UpdateDecision, CheckHistoryEntry)> {
    let semaphore = Arc::new(Semaphore::new(fan_out.max(1)));
    let total = containers.len();
    let mut set = tokio::task::JoinSet::new();

    for (index, (container, policy)) in containers.iter().enumerate() {
      if policy.ignore {
        continue;
      }
      let permit = semaphore.clone();
      let container = container.clone();
      let policy = policy.clone();
      let registry = self.registry.clone();
      let docker = self.docker.clone();
      let cache = self.cache.clone();

      set.spawn(async move {
        let _permit = permit.acquire_owned().await;
        let result =
          check_one(&registry, &docker, &cache, &container, &policy).await;
        (index, result)
      });
    }

    let mut results: Vec<(usize, (UpdateDecision, CheckHistoryEntry))> =
      Vec::with_capacity(containers.len());
    let mut checked = 0usize;
    while let Some(joined) = set.join_next().await {
      match joined {
        Ok((index, result)) => {
          checked += 1;
          events
            .publish(Event::CheckProgress {
              container_name: result.0.container_name.clone(),
              status: result.0.status,
              checked,
              total,
              timestamp: Utc::now(),
            })
            .await;
          results.push((index, result));
        }
        Err(e) => warn!("discovery worker panicked: {e}"),
      }
    }

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, r)| r).collect()
  }
}

async fn check_one(
  registry: &RegistryPool,
  docker: &DockerFacade,
  cache: &Arc<dyn VersionCacheLookup>,
  container: &Container,
  policy: &Policy,
) -> (UpdateDecision, CheckHistoryEntry) {
  let name = container.name.clone();
  let stack = container.stack.clone();

  let decision = check_decision(registry, docker, cache, container, policy)
    .await
    .unwrap_or_else(|e| match e.kind {
      // Transient upstream failures degrade the container rather than
      // failing the scan (spec §7); everything else is a real check
      // failure.
      ErrorKind::Unavailable | ErrorKind::Timeout => {
        UpdateDecision::metadata_unavailable(name.clone(), e.message())
      }
      _ => UpdateDecision::failed(name.clone(), e.message()),
    });

  let history = CheckHistoryEntry {
    container_name: name,
    stack_name: stack,
    status: decision.status,
    current_version: container.image_ref.tag.clone(),
    latest_version: decision.latest_version.clone(),
    checked_at: Utc::now(),
    error: decision.error.clone(),
  };

  (decision, history)
}

async fn check_decision(
  registry: &RegistryPool,
  docker: &DockerFacade,
  cache: &Arc<dyn VersionCacheLookup>,
  container: &Container,
  policy: &Policy,
) -> AppResult<UpdateDecision> {
  let image_ref = &container.image_ref;
  let current_tag = image_ref.tag_or_latest();
  let current_info = parse_image_tag(current_tag);

  let using_latest_tag = !current_info.is_versioned
    && LATEST_LIKE_TAGS.contains(&current_tag)
    && !policy.allow_latest;

  // Digest lookup and the cache short-circuit apply to every container,
  // opaque-tagged or not - it's the cheapest possible no-op check when the
  // running image hasn't changed since we last resolved it.
  let digest = docker.image_digest(&container.image).await.ok().flatten();
  if let Some(digest) = &digest {
    let sha256 = digest.trim_start_matches("sha256:");
    if let Some(cached_version) = cache.get(sha256).await {
      let mut decision = UpdateDecision::up_to_date(container.name.clone());
      decision.current_version = Some(current_info.version.clone());
      decision.latest_version = Some(cached_version);
      decision.using_latest_tag = using_latest_tag;
      return Ok(decision);
    }
  }

  if using_latest_tag {
    // Can't meaningfully select a candidate tag for a rolling reference
    // without allow-latest; report the advisory and stop here.
    let mut decision = UpdateDecision::up_to_date(container.name.clone());
    decision.current_version = Some(current_info.version.clone());
    decision.using_latest_tag = true;
    return Ok(decision);
  }

  let tags = registry.list_tags(image_ref).await?;
  if tags.not_found {
    return Ok(UpdateDecision::local_image(container.name.clone()));
  }

  let candidates: Vec<TagInfo> =
    tags.tags.iter().map(|t| parse_image_tag(t)).collect();

  let picked = select_candidate(&current_info, &candidates, policy);

  let decision = match picked {
    Some(candidate)
      if is_newer(&current_info.version, &candidate.version) =>
    {
      let change_type =
        get_change_type(&current_info.version, &candidate.version);
      UpdateDecision {
        container_name: container.name.clone(),
        status: DecisionStatus::UpdateAvailable,
        current_version: Some(current_info.version.clone()),
        latest_version: Some(candidate.tag.clone()),
        latest_resolved_version: Some(candidate.version.clone()),
        recommended_tag: Some(candidate.tag.clone()),
        change_type: Some(change_type),
        error: None,
        using_latest_tag: false,
      }
    }
    _ => {
      let mut decision = UpdateDecision::up_to_date(container.name.clone());
      decision.current_version = Some(current_info.version.clone());
      decision
    }
  };

  if let Some(digest) = &digest {
    if let Some(resolved_tag) = &decision.recommended_tag {
      let sha256 = digest.trim_start_matches("sha256:");
      cache
        .put(sha256, &image_ref.to_reference_string(), resolved_tag)
        .await;
    }
  }

  Ok(decision)
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;
  use crate::model::{ContainerState, HealthStatus};

  fn container(image: &str) -> Container {
    Container::from_labels(
      "abc123".to_string(),
      "svc".to_string(),
      image.to_string(),
      HashMap::new(),
      ContainerState::Running,
      Some(HealthStatus::Healthy),
      Utc::now(),
      vec![],
      vec![],
    )
  }

  #[test]
  fn latest_like_tag_detected() {
    let c = container("nginx:latest");
    let tag = c.image_ref.tag_or_latest();
    assert!(LATEST_LIKE_TAGS.contains(&tag));
  }

  #[test]
  fn versioned_tag_is_not_latest_like() {
    let c = container("nginx:1.25.3");
    let info = parse_image_tag(c.image_ref.tag_or_latest());
    assert!(info.is_versioned);
  }
}
