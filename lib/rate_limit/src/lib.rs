use std::{sync::Arc, time::Duration};

use cache::CloneCache;
use tokio::{sync::Mutex, time::Instant};

/// Last-tick slot for a single key. `Default` seeds it far enough in the
/// past that the first `acquire` for a new key never waits.
struct TickSlot(Mutex<Instant>);

impl Default for TickSlot {
  fn default() -> Self {
    Self(Mutex::new(Instant::now() - Duration::from_secs(3600)))
  }
}

/// One-token-per-tick rate limiter, keyed by an arbitrary string (in
/// practice a registry host). Callers `acquire(key)` before every outbound
/// request; the call resolves immediately if at least `interval` has
/// elapsed since the last acquire for that key, otherwise it sleeps out
/// the remainder.
///
/// Unlike a background-ticking channel per key (which would need a task
/// spawned per distinct host seen), this tracks only the last-acquired
/// instant per key and sleeps the caller directly - equivalent behavior
/// with no per-key task lifecycle to manage.
pub struct TickLimiter {
  interval: Duration,
  last_tick: CloneCache<String, Arc<TickSlot>>,
}

impl TickLimiter {
  pub fn new(interval: Duration) -> Self {
    Self {
      interval,
      last_tick: CloneCache::default(),
    }
  }

  /// Blocks until a token is available for `key`, then consumes it.
  pub async fn acquire(&self, key: &str) {
    let slot = self
      .last_tick
      .get_or_insert_default(&key.to_string())
      .await;
    let mut last = slot.0.lock().await;
    let now = Instant::now();
    let earliest = *last + self.interval;
    if earliest > now {
      tokio::time::sleep(earliest - now).await;
    }
    *last = Instant::now();
  }
}

impl Default for TickLimiter {
  fn default() -> Self {
    Self::new(Duration::from_millis(100))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn serializes_calls_to_interval() {
    let limiter = TickLimiter::new(Duration::from_millis(50));
    let start = Instant::now();
    limiter.acquire("docker.io").await;
    limiter.acquire("docker.io").await;
    limiter.acquire("docker.io").await;
    assert!(start.elapsed() >= Duration::from_millis(100));
  }

  #[tokio::test]
  async fn distinct_keys_do_not_block_each_other() {
    let limiter = TickLimiter::new(Duration::from_millis(200));
    limiter.acquire("docker.io").await;
    let start = Instant::now();
    limiter.acquire("ghcr.io").await;
    assert!(start.elapsed() < Duration::from_millis(50));
  }
}
