use serde::Deserialize;

use super::{TagList, http_error, with_retry};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
struct TagsPage {
  next: Option<String>,
  results: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
  name: String,
}

/// `hub.docker.com/v2/repositories/{repo}/tags`, paginated (spec §4.1).
pub async fn list_tags(
  http: &reqwest::Client,
  repository: &str,
) -> Result<TagList, AppError> {
  let mut url = format!(
    "https://hub.docker.com/v2/repositories/{repository}/tags?page_size=100"
  );
  let mut tags = Vec::new();

  loop {
    let page = with_retry(|| fetch_page(http, &url)).await;
    let page = match page {
      Ok(page) => page,
      Err(e) if e.kind == crate::error::ErrorKind::NotFound => {
        return Ok(TagList { tags: vec![], not_found: true });
      }
      Err(e) => return Err(e),
    };

    tags.extend(page.results.into_iter().map(|t| t.name));

    match page.next {
      Some(next) => url = next,
      None => break,
    }
  }

  Ok(TagList { tags, not_found: false })
}

async fn fetch_page(
  http: &reqwest::Client,
  url: &str,
) -> Result<TagsPage, AppError> {
  let resp = http
    .get(url)
    .send()
    .await
    .map_err(|e| http_error("docker hub tags request", e))?;

  if resp.status().as_u16() == 404 {
    return Err(AppError::new(
      crate::error::ErrorKind::NotFound,
      anyhow::anyhow!("repository not found on docker hub"),
    ));
  }
  if !resp.status().is_success() {
    let status = resp.status();
    return Err(AppError::new(
      if status.is_server_error() {
        crate::error::ErrorKind::Unavailable
      } else {
        crate::error::ErrorKind::PermissionDenied
      },
      anyhow::anyhow!("docker hub responded {status}"),
    ));
  }

  resp
    .json::<TagsPage>()
    .await
    .map_err(|e| http_error("docker hub tags response", e))
}
