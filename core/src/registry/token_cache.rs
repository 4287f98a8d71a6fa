use std::time::{Duration, Instant};

use cache::CloneCache;
use tokio::sync::Mutex;

struct TokenEntry {
  token: String,
  expires_at: Instant,
}

/// Process-wide `(repository -> token, expiresAt)` cache, safe for
/// concurrent use, with early eviction at `now >= expiresAt` (spec §4.1).
#[derive(Default)]
pub struct TokenCache {
  entries: CloneCache<(String, String), std::sync::Arc<Mutex<Option<TokenEntry>>>>,
}

impl TokenCache {
  pub async fn get(&self, registry: &str, repository: &str) -> Option<String> {
    let key = (registry.to_string(), repository.to_string());
    let slot = self.entries.get(&key).await?;
    let guard = slot.lock().await;
    match guard.as_ref() {
      Some(entry) if entry.expires_at > Instant::now() => {
        Some(entry.token.clone())
      }
      _ => None,
    }
  }

  pub async fn set(
    &self,
    registry: String,
    repository: String,
    token: String,
    ttl: Duration,
  ) {
    let key = (registry, repository);
    let slot = self.entries.get_or_insert_default(&key).await;
    let mut guard = slot.lock().await;
    *guard = Some(TokenEntry {
      token,
      // Early eviction margin so a request doesn't race token expiry.
      expires_at: Instant::now()
        + ttl.saturating_sub(Duration::from_secs(10)),
    });
  }
}
