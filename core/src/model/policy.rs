use std::collections::HashMap;

use regex::Regex;

use crate::version::{Version, parse_tag};

const LABEL_PREFIX: &str = "docksmith.";

/// Per-container policy, assembled from `docksmith.*` labels (spec §3)
/// with a fallback to an explicit [`crate::model::ScriptAssignment`] per
/// spec §4.9's "orchestrator reads assignments first, then falls back to
/// labels" rule.
#[derive(Debug, Clone, Default)]
pub struct Policy {
  pub ignore: bool,
  pub allow_latest: bool,
  pub version_pin_major: bool,
  pub version_pin_minor: bool,
  pub tag_regex: Option<Regex>,
  pub version_min: Option<Version>,
  pub version_max: Option<Version>,
  /// Containers to restart after this one updates.
  pub restart_after: Vec<String>,
  pub pre_update_check: Option<String>,
  pub auto_rollback: bool,
}

impl Policy {
  /// Parses policy from a container's compose/docker labels.
  pub fn from_labels(labels: &HashMap<String, String>) -> Self {
    let get = |key: &str| labels.get(&format!("{LABEL_PREFIX}{key}"));
    let flag = |key: &str| {
      get(key).is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
    };

    Policy {
      ignore: flag("ignore"),
      allow_latest: flag("allow-latest"),
      version_pin_major: flag("version-pin-major"),
      version_pin_minor: flag("version-pin-minor"),
      tag_regex: get("tag-regex").and_then(|p| Regex::new(p).ok()),
      version_min: get("version-min").and_then(|s| parse_tag(s)),
      version_max: get("version-max").and_then(|s| parse_tag(s)),
      restart_after: get("restart-after")
        .map(|v| {
          v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
        })
        .unwrap_or_default(),
      pre_update_check: get("pre-update-check").cloned(),
      auto_rollback: get("auto_rollback")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        // Default-on: rollback-on-failure is the safe default absent an
        // explicit label.
        .unwrap_or(true),
    }
  }

  /// Overlays an explicit [`crate::model::ScriptAssignment`] on top of
  /// label-derived policy, per the "assignments first, then labels"
  /// precedence rule.
  pub fn merge_assignment(
    mut self,
    assignment: Option<&crate::model::ScriptAssignment>,
  ) -> Self {
    if let Some(a) = assignment {
      if a.enabled {
        self.pre_update_check = Some(a.script_path.clone());
      }
      self.ignore = a.ignore;
      self.allow_latest = a.allow_latest;
    }
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_restart_after_list() {
    let mut labels = HashMap::new();
    labels.insert(
      "docksmith.restart-after".to_string(),
      "svc-a, svc-b".to_string(),
    );
    let policy = Policy::from_labels(&labels);
    assert_eq!(policy.restart_after, vec!["svc-a", "svc-b"]);
  }

  #[test]
  fn auto_rollback_defaults_true() {
    let policy = Policy::from_labels(&HashMap::new());
    assert!(policy.auto_rollback);
  }

  #[test]
  fn ignore_flag_parses_bool_variants() {
    let mut labels = HashMap::new();
    labels
      .insert("docksmith.ignore".to_string(), "true".to_string());
    assert!(Policy::from_labels(&labels).ignore);
  }
}
