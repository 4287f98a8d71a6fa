use std::time::Duration;

use anyhow::Context;
use logger::{LogConfig, LogLevel};
use serde::Deserialize;

fn default_db_path() -> String {
  "/data/docksmith.db".to_string()
}

fn default_check_interval() -> u64 {
  300
}

fn default_cache_ttl() -> u64 {
  3600
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_fan_out() -> usize {
  3
}

fn default_rate_limit_interval_ms() -> u64 {
  100
}

fn default_scripts_dir() -> String {
  "/scripts".to_string()
}

fn default_event_queue_capacity() -> usize {
  64
}

/// Process configuration, loaded once at startup (spec §6's environment
/// table) and threaded through constructors rather than read back out of a
/// process-wide singleton - the REDESIGN FLAG in spec §9.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  #[serde(default = "default_check_interval")]
  pub check_interval: u64,
  #[serde(default = "default_cache_ttl")]
  pub cache_ttl: u64,
  #[serde(default = "default_db_path")]
  pub db_path: String,
  #[serde(default = "default_log_level")]
  pub log_level: String,
  pub github_token: Option<String>,
  #[serde(default = "default_fan_out")]
  pub discovery_fan_out: usize,
  #[serde(default = "default_rate_limit_interval_ms")]
  pub registry_rate_limit_interval_ms: u64,
  #[serde(default = "default_scripts_dir")]
  pub scripts_dir: String,
  #[serde(default = "default_event_queue_capacity")]
  pub event_queue_capacity: usize,
  /// Container id of the manager's own container, when running
  /// containerized. Populated by self-detection at startup, not read from
  /// the environment directly.
  #[serde(skip)]
  pub self_container_id: Option<String>,
}

impl Config {
  pub fn load() -> anyhow::Result<Self> {
    // Ignore a missing .env - environment variables set directly still
    // apply.
    let _ = dotenvy::dotenv();
    envy::from_env::<Config>()
      .context("failed to load configuration from environment")
  }

  pub fn check_interval(&self) -> Duration {
    Duration::from_secs(self.check_interval)
  }

  pub fn cache_ttl(&self) -> Duration {
    Duration::from_secs(self.cache_ttl)
  }

  pub fn cache_sweep_interval(&self) -> Duration {
    self.cache_ttl() / 2
  }

  pub fn registry_rate_limit_interval(&self) -> Duration {
    Duration::from_millis(self.registry_rate_limit_interval_ms)
  }

  pub fn log_config(&self) -> LogConfig {
    LogConfig {
      level: LogLevel::parse(&self.log_level),
      json: false,
      ansi: true,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_apply_when_env_absent() {
    // SAFETY: single-threaded test, no concurrent env mutation.
    unsafe {
      std::env::remove_var("CHECK_INTERVAL");
      std::env::remove_var("DB_PATH");
    }
    let config = envy::from_env::<Config>().unwrap();
    assert_eq!(config.check_interval, 300);
    assert_eq!(config.db_path, "/data/docksmith.db");
  }
}
