use serde::Deserialize;
use std::time::Duration;

use super::{TagList, http_error, with_retry};
use crate::error::{AppError, ErrorKind};

#[derive(Debug, Deserialize)]
struct TagsListResponse {
  #[serde(default)]
  tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  #[serde(alias = "access_token")]
  token: String,
  #[serde(default = "default_expires_in")]
  expires_in: u64,
}

fn default_expires_in() -> u64 {
  300
}

pub struct ExchangedToken {
  pub token: String,
  pub expires_in: Duration,
}

/// Distribution v2 `/v2/{repo}/tags/list`, every registry host other than
/// Docker Hub (spec §4.1).
pub async fn list_tags(
  http: &reqwest::Client,
  registry: &str,
  repository: &str,
  bearer_token: Option<&str>,
) -> Result<TagList, AppError> {
  let url = format!("https://{registry}/v2/{repository}/tags/list");

  let result = with_retry(|| {
    let url = url.clone();
    async move {
      let mut req = http.get(&url);
      if let Some(token) = bearer_token {
        req = req.bearer_auth(token);
      }
      let resp = req
        .send()
        .await
        .map_err(|e| http_error("v2 tags request", e))?;

      if resp.status().as_u16() == 404 {
        return Err(AppError::new(
          ErrorKind::NotFound,
          anyhow::anyhow!("repository not found"),
        ));
      }
      if !resp.status().is_success() {
        let status = resp.status();
        return Err(AppError::new(
          if status.is_server_error() || status.as_u16() == 429 {
            ErrorKind::Unavailable
          } else {
            ErrorKind::PermissionDenied
          },
          anyhow::anyhow!("v2 tags list responded {status}"),
        ));
      }

      resp
        .json::<TagsListResponse>()
        .await
        .map_err(|e| http_error("v2 tags response", e))
    }
  })
  .await;

  match result {
    Ok(parsed) => Ok(TagList { tags: parsed.tags, not_found: false }),
    Err(e) if e.kind == ErrorKind::NotFound => {
      Ok(TagList { tags: vec![], not_found: true })
    }
    Err(e) => Err(e),
  }
}

/// Parses a `WWW-Authenticate: Bearer realm="...",service="...",scope="..."`
/// challenge header into its key/value parts.
fn parse_bearer_challenge(
  header: &str,
) -> Option<(String, Option<String>, Option<String>)> {
  let rest = header.strip_prefix("Bearer ")?;
  let mut realm = None;
  let mut service = None;
  let mut scope = None;
  for part in rest.split(',') {
    let (key, value) = part.trim().split_once('=')?;
    let value = value.trim_matches('"').to_string();
    match key {
      "realm" => realm = Some(value),
      "service" => service = Some(value),
      "scope" => scope = Some(value),
      _ => {}
    }
  }
  Some((realm?, service, scope))
}

/// Performs the Distribution v2 bearer-token exchange: probe the registry
/// unauthenticated to discover the `WWW-Authenticate` challenge, then
/// request a token from the realm it names, optionally with basic auth
/// bootstrapped from the Docker config credential mount.
pub async fn exchange_token(
  http: &reqwest::Client,
  registry: &str,
  repository: &str,
  basic_auth: Option<&(String, String)>,
) -> anyhow::Result<ExchangedToken> {
  let probe_url = format!("https://{registry}/v2/{repository}/tags/list");
  let probe = http.get(&probe_url).send().await?;

  let challenge = probe
    .headers()
    .get("www-authenticate")
    .and_then(|v| v.to_str().ok())
    .and_then(parse_bearer_challenge);

  let Some((realm, service, scope)) = challenge else {
    anyhow::bail!("registry did not present a bearer challenge");
  };

  let mut req = http.get(&realm);
  let mut query = Vec::new();
  if let Some(service) = &service {
    query.push(("service", service.as_str()));
  }
  let scope = scope.unwrap_or_else(|| format!("repository:{repository}:pull"));
  query.push(("scope", scope.as_str()));
  req = req.query(&query);

  if let Some((user, pass)) = basic_auth {
    req = req.basic_auth(user, Some(pass));
  }

  let resp = req.send().await?;
  if !resp.status().is_success() {
    anyhow::bail!("token endpoint responded {}", resp.status());
  }
  let parsed: TokenResponse = resp.json().await?;
  Ok(ExchangedToken {
    token: parsed.token,
    expires_in: Duration::from_secs(parsed.expires_in),
  })
}
