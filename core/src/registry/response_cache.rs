use std::time::{Duration, Instant};

use cache::CloneCache;

use super::TagList;

struct Entry {
  value: TagList,
  expires_at: Instant,
}

/// Keyed by `(host, repository)` - the pool only ever caches the
/// `list_tags` operation, so the `op` dimension from spec §4.1 collapses
/// to this one case. TTL configurable (default 1h per spec).
pub struct ResponseCache {
  ttl: Duration,
  entries: CloneCache<(String, String), Entry>,
}

impl Clone for Entry {
  fn clone(&self) -> Self {
    Entry { value: self.value.clone(), expires_at: self.expires_at }
  }
}

impl ResponseCache {
  pub fn new(ttl: Duration) -> Self {
    Self { ttl, entries: CloneCache::default() }
  }

  pub async fn get(&self, key: &(String, String)) -> Option<TagList> {
    let entry = self.entries.get(key).await?;
    if entry.expires_at > Instant::now() {
      Some(entry.value)
    } else {
      None
    }
  }

  pub async fn set(&self, key: (String, String), value: TagList) {
    self
      .entries
      .insert(key, Entry { value, expires_at: Instant::now() + self.ttl })
      .await;
  }

  /// Drops entries past their TTL (spec §4.10's `CACHE_TTL / 2` sweep).
  /// `get` already treats an expired entry as absent, so this is purely
  /// about reclaiming memory, not correctness.
  pub async fn sweep_expired(&self) -> usize {
    let now = Instant::now();
    let mut swept = 0;
    for (key, entry) in self.entries.get_entries().await {
      if entry.expires_at <= now {
        self.entries.remove(&key).await;
        swept += 1;
      }
    }
    swept
  }
}
