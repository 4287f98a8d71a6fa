use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Memoizes the resolved version of a pulled image by its digest (spec
/// §3). Keyed by `sha256`; never invalidated (spec §9's Open Question -
/// digest-keyed entries are effectively immutable content-addressed
/// facts, so no TTL applies here, unlike the registry response cache).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionCacheEntry {
  pub sha256: String,
  pub image_ref: String,
  pub version: String,
  pub arch: String,
  pub stored_at: DateTime<Utc>,
}
