use serde::{Deserialize, Serialize};

use crate::version::split_tag_from_reference;

pub const DEFAULT_REGISTRY: &str = "docker.io";

/// `(registry, repository, tag?, digest?)` per spec §3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
  pub registry: String,
  pub repository: String,
  pub tag: Option<String>,
  pub digest: Option<String>,
}

impl ImageRef {
  /// Parses a Docker image reference. Handles `@sha256:` digests, bare
  /// Docker Hub names (adds the implicit `library/` prefix), and
  /// registry-host-qualified repositories.
  pub fn parse(reference: &str) -> Self {
    let (before_digest, digest) = match reference.split_once('@') {
      Some((before, digest)) => {
        (before, Some(digest.to_string()))
      }
      None => (reference, None),
    };

    let (repo_and_registry, tag) =
      split_tag_from_reference(before_digest);

    let (registry, repository) =
      split_registry(repo_and_registry);

    ImageRef {
      registry,
      repository,
      tag: tag.map(str::to_string),
      digest,
    }
  }

  /// Tag with `latest` substituted when absent, for display purposes.
  pub fn tag_or_latest(&self) -> &str {
    self.tag.as_deref().unwrap_or("latest")
  }

  pub fn full_repository(&self) -> String {
    if self.registry == DEFAULT_REGISTRY {
      self.repository.clone()
    } else {
      format!("{}/{}", self.registry, self.repository)
    }
  }

  pub fn to_reference_string(&self) -> String {
    let base = format!("{}/{}", self.registry, self.repository);
    match (&self.tag, &self.digest) {
      (_, Some(digest)) => format!("{base}@{digest}"),
      (Some(tag), None) => format!("{base}:{tag}"),
      (None, None) => base,
    }
  }
}

/// Splits the registry host off a repository path, defaulting to
/// `docker.io` and prefixing bare Docker Hub repos with `library/`.
fn split_registry(repo: &str) -> (String, String) {
  let mut parts = repo.splitn(2, '/');
  let first = parts.next().unwrap_or_default();
  let rest = parts.next();

  let looks_like_host =
    first.contains('.') || first.contains(':') || first == "localhost";

  match (looks_like_host, rest) {
    (true, Some(rest)) => (first.to_string(), rest.to_string()),
    (true, None) => {
      // A lone host-looking segment with no path is nonsensical for an
      // image reference; treat it as a Docker Hub repo instead.
      (DEFAULT_REGISTRY.to_string(), normalize_hub_repo(first))
    }
    (false, _) => {
      (DEFAULT_REGISTRY.to_string(), normalize_hub_repo(repo))
    }
  }
}

fn normalize_hub_repo(repo: &str) -> String {
  if repo.contains('/') {
    repo.to_string()
  } else {
    format!("library/{repo}")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bare_name_gets_library_prefix() {
    let r = ImageRef::parse("nginx:1.25");
    assert_eq!(r.registry, "docker.io");
    assert_eq!(r.repository, "library/nginx");
    assert_eq!(r.tag.as_deref(), Some("1.25"));
  }

  #[test]
  fn namespaced_hub_repo_untouched() {
    let r = ImageRef::parse("grafana/grafana:10.0.0");
    assert_eq!(r.registry, "docker.io");
    assert_eq!(r.repository, "grafana/grafana");
  }

  #[test]
  fn ghcr_reference() {
    let r = ImageRef::parse("ghcr.io/owner/repo:v1.2.3");
    assert_eq!(r.registry, "ghcr.io");
    assert_eq!(r.repository, "owner/repo");
    assert_eq!(r.tag.as_deref(), Some("v1.2.3"));
  }

  #[test]
  fn digest_pinned_reference() {
    let r = ImageRef::parse(
      "ghcr.io/owner/repo@sha256:deadbeefdeadbeefdeadbeefdeadbeef",
    );
    assert_eq!(r.tag, None);
    assert!(r.digest.is_some());
  }

  #[test]
  fn host_with_port() {
    let r = ImageRef::parse("registry.local:5000/app:1.0.0");
    assert_eq!(r.registry, "registry.local:5000");
    assert_eq!(r.repository, "app");
  }
}
