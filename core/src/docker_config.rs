//! Reads the standard Docker CLI config (`$DOCKER_CONFIG/config.json` or
//! `~/.docker/config.json`) for registry credentials, used to bootstrap
//! the bearer-token exchange in the registry client pool (spec §4.1).

use std::{collections::HashMap, path::PathBuf};

use base64::Engine;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct DockerConfigFile {
  #[serde(default)]
  auths: HashMap<String, DockerConfigAuth>,
}

#[derive(Debug, Deserialize)]
struct DockerConfigAuth {
  auth: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct DockerConfigCredentials {
  /// registry host -> "username:password"
  decoded: HashMap<String, String>,
}

impl DockerConfigCredentials {
  pub fn load() -> Self {
    let path = Self::config_path();
    let Some(path) = path else { return Self::default() };
    let Ok(contents) = std::fs::read_to_string(&path) else {
      return Self::default();
    };
    let Ok(parsed) =
      serde_json::from_str::<DockerConfigFile>(&contents)
    else {
      return Self::default();
    };

    let decoded = parsed
      .auths
      .into_iter()
      .filter_map(|(host, auth)| {
        let raw = auth.auth?;
        let bytes = base64::engine::general_purpose::STANDARD
          .decode(raw)
          .ok()?;
        let text = String::from_utf8(bytes).ok()?;
        Some((host, text))
      })
      .collect();

    Self { decoded }
  }

  fn config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCKER_CONFIG") {
      return Some(PathBuf::from(dir).join("config.json"));
    }
    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".docker").join("config.json"))
  }

  /// Returns `(username, password)` for `registry`, if a credential
  /// exists for it.
  pub fn basic_auth_for(
    &self,
    registry: &str,
  ) -> Option<(String, String)> {
    let decoded = self
      .decoded
      .get(registry)
      .or_else(|| self.decoded.get(&format!("https://{registry}")))
      .or_else(|| {
        self.decoded.get(&format!("https://{registry}/v1/"))
      })?;
    decoded.split_once(':').map(|(u, p)| (u.to_string(), p.to_string()))
  }
}
