//! Registry Client Pool (spec §4.1): tag listing and digest lookup across
//! Docker Hub, GHCR, and generic Distribution v2 registries, with response
//! caching, token caching, and per-host rate limiting.

mod distribution;
mod dockerhub;
mod ghcr;
mod response_cache;
mod token_cache;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use rate_limit::TickLimiter;
use tracing::{info, warn};

use self::{response_cache::ResponseCache, token_cache::TokenCache};
use crate::{
  config::Config,
  docker_config::DockerConfigCredentials,
  error::{AppError, ErrorKind},
  model::ImageRef,
};

/// Full tag list or not-found flag for an image repository.
#[derive(Debug, Clone, Default)]
pub struct TagList {
  pub tags: Vec<String>,
  pub not_found: bool,
}

pub struct RegistryPool {
  http: reqwest::Client,
  rate_limiter: TickLimiter,
  response_cache: ResponseCache,
  token_cache: TokenCache,
  credentials: DockerConfigCredentials,
  github_token: Option<String>,
}

impl RegistryPool {
  pub fn new(config: &Config) -> Self {
    RegistryPool {
      http: reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("reqwest client builds with static config"),
      rate_limiter: TickLimiter::new(
        config.registry_rate_limit_interval(),
      ),
      response_cache: ResponseCache::new(config.cache_ttl()),
      token_cache: TokenCache::default(),
      credentials: DockerConfigCredentials::load(),
      github_token: config.github_token.clone(),
    }
  }

  /// Fetches the full tag set for `image`, applying the GHCR fallback
  /// rule and response caching. Empty with `not_found = true` on a 404.
  pub async fn list_tags(
    &self,
    image: &ImageRef,
  ) -> Result<TagList, AppError> {
    let cache_key = (image.registry.clone(), image.repository.clone());
    if let Some(cached) =
      self.response_cache.get(&cache_key).await
    {
      return Ok(cached);
    }

    let result = self.list_tags_uncached(image).await?;
    self.response_cache.set(cache_key, result.clone()).await;
    Ok(result)
  }

  /// Cache-expiry sweep (spec §4.10, run on a `CACHE_TTL / 2` tick by the
  /// scheduler).
  pub async fn sweep_expired_cache(&self) -> usize {
    self.response_cache.sweep_expired().await
  }

  async fn list_tags_uncached(
    &self,
    image: &ImageRef,
  ) -> Result<TagList, AppError> {
    match image.registry.as_str() {
      "ghcr.io" => self.list_tags_ghcr(image).await,
      "docker.io" => {
        self.rate_limiter.acquire("docker.io").await;
        dockerhub::list_tags(&self.http, &image.repository).await
      }
      host => {
        self.rate_limiter.acquire(host).await;
        let token = self.bearer_token(image).await;
        distribution::list_tags(
          &self.http,
          &image.registry,
          &image.repository,
          token.as_deref(),
        )
        .await
      }
    }
  }

  /// GHCR fallback rule (spec §4.1): query both Packages and v2, the
  /// larger tag set wins, v2 preferred on ties.
  async fn list_tags_ghcr(
    &self,
    image: &ImageRef,
  ) -> Result<TagList, AppError> {
    self.rate_limiter.acquire("ghcr.io").await;

    let packages = match &self.github_token {
      Some(token) => {
        ghcr::list_tags_packages(&self.http, &image.repository, token)
          .await
          .unwrap_or_default()
      }
      None => TagList::default(),
    };

    let token = self.bearer_token(image).await;
    let v2 = distribution::list_tags(
      &self.http,
      "ghcr.io",
      &image.repository,
      token.as_deref(),
    )
    .await
    .unwrap_or_default();

    if v2.tags.len() > packages.tags.len() {
      if !packages.tags.is_empty() {
        info!(
          repository = %image.repository,
          v2_count = v2.tags.len(),
          packages_count = packages.tags.len(),
          "GHCR v2 tag set exceeds Packages API - using v2",
        );
      }
      Ok(v2)
    } else if packages.tags.is_empty() && v2.tags.is_empty() {
      Ok(TagList { tags: vec![], not_found: true })
    } else {
      // Tie-break: v2 preferred on equal set sizes.
      Ok(if v2.tags.len() == packages.tags.len() { v2 } else { packages })
    }
  }

  async fn bearer_token(&self, image: &ImageRef) -> Option<String> {
    if let Some(token) =
      self.token_cache.get(&image.registry, &image.repository).await
    {
      return Some(token);
    }
    let basic_auth = self.credentials.basic_auth_for(&image.registry);
    let token = distribution::exchange_token(
      &self.http,
      &image.registry,
      &image.repository,
      basic_auth.as_ref(),
    )
    .await
    .inspect_err(|e| warn!("token exchange failed: {e:#}"))
    .ok()?;
    self
      .token_cache
      .set(
        image.registry.clone(),
        image.repository.clone(),
        token.token.clone(),
        token.expires_in,
      )
      .await;
    Some(token.token)
  }
}

/// Retries transient failures with exponential backoff and full jitter
/// (spec §4.1: "max 3 attempts"; jitter/base made explicit per
/// DESIGN.md's Open Question resolution).
pub(crate) async fn with_retry<T, F, Fut>(
  mut attempt: F,
) -> Result<T, AppError>
where
  F: FnMut() -> Fut,
  Fut: std::future::Future<Output = Result<T, AppError>>,
{
  const MAX_ATTEMPTS: u32 = 3;
  const BASE: Duration = Duration::from_millis(500);

  let mut last_err = None;
  for n in 0..MAX_ATTEMPTS {
    match attempt().await {
      Ok(v) => return Ok(v),
      Err(e) if !is_retryable(&e) => return Err(e),
      Err(e) => {
        last_err = Some(e);
        if n + 1 < MAX_ATTEMPTS {
          let backoff = BASE * 2u32.pow(n);
          let jitter = Duration::from_millis(
            rand_jitter_ms(backoff.as_millis() as u64),
          );
          tokio::time::sleep(jitter).await;
        }
      }
    }
  }
  Err(last_err.unwrap_or_else(|| {
    AppError::new(ErrorKind::Unavailable, anyhow::anyhow!("retry loop exited with no attempts"))
  }))
}

fn is_retryable(e: &AppError) -> bool {
  matches!(e.kind, ErrorKind::Unavailable | ErrorKind::Timeout)
}

/// Full-jitter backoff: uniform in `[0, cap]`. Avoids pulling in a `rand`
/// dependency for one call site - seeded from the current instant's
/// subsecond nanos, which is adequate entropy for jitter (not a security
/// boundary).
fn rand_jitter_ms(cap_ms: u64) -> u64 {
  let nanos = std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.subsec_nanos() as u64)
    .unwrap_or(0);
  if cap_ms == 0 { 0 } else { nanos % cap_ms }
}

pub(crate) fn http_error(context: &str, e: reqwest::Error) -> AppError {
  let kind = if e.is_timeout() {
    ErrorKind::Timeout
  } else if e.is_connect() || e.status().is_none_or(|s| s.is_server_error())
  {
    ErrorKind::Unavailable
  } else if matches!(
    e.status().map(|s| s.as_u16()),
    Some(401) | Some(403)
  ) {
    ErrorKind::PermissionDenied
  } else {
    ErrorKind::Unavailable
  };
  AppError::new(kind, anyhow::Error::new(e).context(context.to_string()))
}
