use chrono::Utc;
use sqlx::Row;

use super::Store;
use crate::discovery::VersionCacheLookup;

impl Store {
  pub async fn version_cache_get(&self, sha256: &str) -> Option<String> {
    sqlx::query("SELECT version FROM version_cache WHERE sha256 = ?")
      .bind(sha256)
      .fetch_optional(self.pool())
      .await
      .ok()
      .flatten()
      .and_then(|row| row.try_get("version").ok())
  }

  pub async fn version_cache_put(
    &self,
    sha256: &str,
    image_ref: &str,
    version: &str,
  ) {
    let _ = sqlx::query(
      "INSERT INTO version_cache (sha256, image_ref, version, arch, stored_at) \
       VALUES (?, ?, ?, '', ?) \
       ON CONFLICT(sha256) DO UPDATE SET version = excluded.version, \
       image_ref = excluded.image_ref, stored_at = excluded.stored_at",
    )
    .bind(sha256)
    .bind(image_ref)
    .bind(version)
    .bind(Utc::now().to_rfc3339())
    .execute(self.pool())
    .await;
  }
}

/// Digest-keyed entries are never invalidated (spec §9's Open Question -
/// content-addressed, effectively immutable), so the store needs no TTL
/// sweep here unlike the registry response cache.
#[async_trait::async_trait]
impl VersionCacheLookup for Store {
  async fn get(&self, sha256: &str) -> Option<String> {
    self.version_cache_get(sha256).await
  }

  async fn put(&self, sha256: &str, image_ref: &str, version: &str) {
    self.version_cache_put(sha256, image_ref, version).await
  }
}
