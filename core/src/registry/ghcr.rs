use serde::Deserialize;

use super::{TagList, http_error, with_retry};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
struct PackageVersion {
  metadata: Option<VersionMetadata>,
}

#[derive(Debug, Deserialize)]
struct VersionMetadata {
  container: Option<ContainerMetadata>,
}

#[derive(Debug, Deserialize)]
struct ContainerMetadata {
  #[serde(default)]
  tags: Vec<String>,
}

/// GitHub Packages API, paginated at 100/page, capped at 300 total
/// versions (spec §4.1's note on why v2 can see more). `repository` is
/// `owner/name`; GHCR container packages are addressed by owner + package
/// name, where the package name is the path after `owner/`.
pub async fn list_tags_packages(
  http: &reqwest::Client,
  repository: &str,
  github_token: &str,
) -> Result<TagList, AppError> {
  let (owner, package) = repository
    .split_once('/')
    .ok_or_else(|| {
      AppError::new(
        crate::error::ErrorKind::ValidationError,
        anyhow::anyhow!("GHCR repository must be owner/package"),
      )
    })?;

  let mut tags = Vec::new();
  let mut page = 1;
  const MAX_PAGES: u32 = 3;

  while page <= MAX_PAGES {
    let url = format!(
      "https://api.github.com/orgs/{owner}/packages/container/{package}/versions?per_page=100&page={page}"
    );
    let versions: Vec<PackageVersion> = with_retry(|| {
      fetch_versions(http, &url, github_token)
    })
    .await?;

    if versions.is_empty() {
      break;
    }
    for v in &versions {
      if let Some(tags_for_version) = v
        .metadata
        .as_ref()
        .and_then(|m| m.container.as_ref())
        .map(|c| &c.tags)
      {
        tags.extend(tags_for_version.iter().cloned());
      }
    }
    page += 1;
  }

  Ok(TagList { tags, not_found: false })
}

async fn fetch_versions(
  http: &reqwest::Client,
  url: &str,
  github_token: &str,
) -> Result<Vec<PackageVersion>, AppError> {
  let resp = http
    .get(url)
    .bearer_auth(github_token)
    .header("Accept", "application/vnd.github+json")
    .header("User-Agent", "docksmith")
    .send()
    .await
    .map_err(|e| http_error("GHCR packages request", e))?;

  if resp.status().as_u16() == 404 {
    return Ok(vec![]);
  }
  if !resp.status().is_success() {
    let status = resp.status();
    return Err(AppError::new(
      if status.is_server_error() {
        crate::error::ErrorKind::Unavailable
      } else {
        crate::error::ErrorKind::PermissionDenied
      },
      anyhow::anyhow!("GHCR packages API responded {status}"),
    ));
  }

  resp
    .json()
    .await
    .map_err(|e| http_error("GHCR packages response", e))
}
