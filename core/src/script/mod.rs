//! Script Executor (spec §4.11): pre-update check scripts, sandboxed to a
//! configured root directory and a hard timeout.

use std::{
  path::{Component, Path, PathBuf},
  time::Duration,
};

use command::run_script_with_timeout;

/// Hard ceiling on script execution, regardless of caller-supplied env.
pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
  #[error("script path escapes the scripts directory: {0}")]
  OutsideRoot(String),
  #[error("script exited non-zero ({exit_code}): {output}")]
  NonZeroExit { exit_code: i32, output: String },
}

pub struct ScriptOutcome {
  pub exit_code: i32,
  pub output: String,
}

pub struct ScriptExecutor {
  root: PathBuf,
}

impl ScriptExecutor {
  pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
    ScriptExecutor { root: scripts_dir.into() }
  }

  /// Resolves `script_path` against the scripts root, rejecting any path
  /// that normalizes outside of it (spec §4.11).
  fn resolve(&self, script_path: &str) -> Result<PathBuf, ScriptError> {
    let candidate = Path::new(script_path);
    let joined =
      if candidate.is_absolute() { candidate.to_path_buf() } else { self.root.join(candidate) };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
      match component {
        Component::ParentDir => {
          normalized.pop();
        }
        Component::CurDir => {}
        other => normalized.push(other.as_os_str()),
      }
    }

    if !normalized.starts_with(&self.root) {
      return Err(ScriptError::OutsideRoot(script_path.to_string()));
    }
    Ok(normalized)
  }

  /// Lists the scripts available under the root, as paths relative to it
  /// (`GET /api/scripts`). Missing root directory is reported as empty
  /// rather than an error - nothing has been assigned yet.
  pub fn list(&self) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(&self.root) else { return vec![] };
    let mut names: Vec<String> = entries
      .filter_map(|e| e.ok())
      .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
      .filter_map(|e| e.file_name().into_string().ok())
      .collect();
    names.sort();
    names
  }

  /// Whether `script_path` resolves inside the root, without running
  /// anything (`POST /api/scripts/assign` validates eagerly rather than
  /// discovering a bad path at the next pre-check).
  pub fn contains(&self, script_path: &str) -> bool {
    self.resolve(script_path).is_ok()
  }

  /// Runs the script with `CONTAINER_NAME` (and any extra `envs`) set,
  /// under [`SCRIPT_TIMEOUT`]. Non-zero exit is a precheck failure, not an
  /// execution error - callers inspect [`ScriptOutcome`] directly, or use
  /// [`ScriptExecutor::run_precheck`] for the orchestrator's abort-on-fail
  /// convenience.
  pub async fn run(
    &self,
    script_path: &str,
    container_name: &str,
    extra_envs: &[(String, String)],
  ) -> Result<ScriptOutcome, ScriptError> {
    let resolved = self.resolve(script_path)?;

    let mut envs = vec![("CONTAINER_NAME".to_string(), container_name.to_string())];
    envs.extend(extra_envs.iter().cloned());

    let output =
      run_script_with_timeout(&resolved, &envs, SCRIPT_TIMEOUT).await;

    Ok(ScriptOutcome {
      exit_code: output.exit_code(),
      output: format!("{}{}", output.stdout, output.stderr),
    })
  }

  /// Convenience wrapper for the orchestrator's pre-check stage: turns a
  /// non-zero exit into a typed error so `?` aborts the operation.
  pub async fn run_precheck(
    &self,
    script_path: &str,
    container_name: &str,
  ) -> Result<ScriptOutcome, ScriptError> {
    let outcome = self.run(script_path, container_name, &[]).await?;
    if outcome.exit_code != 0 {
      return Err(ScriptError::NonZeroExit {
        exit_code: outcome.exit_code,
        output: outcome.output,
      });
    }
    Ok(outcome)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_traversal_outside_root() {
    let executor = ScriptExecutor::new("/scripts");
    let err = executor.resolve("../etc/passwd").unwrap_err();
    assert!(matches!(err, ScriptError::OutsideRoot(_)));
  }

  #[test]
  fn accepts_relative_path_within_root() {
    let executor = ScriptExecutor::new("/scripts");
    let resolved = executor.resolve("pre-check.sh").unwrap();
    assert_eq!(resolved, PathBuf::from("/scripts/pre-check.sh"));
  }

  #[test]
  fn normalizes_dot_segments_within_root() {
    let executor = ScriptExecutor::new("/scripts");
    let resolved = executor.resolve("./sub/../pre-check.sh").unwrap();
    assert_eq!(resolved, PathBuf::from("/scripts/pre-check.sh"));
  }

  #[tokio::test]
  async fn runs_a_real_script_and_captures_output() {
    let dir = std::env::temp_dir().join(format!(
      "docksmith-script-test-{}",
      std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let script = dir.join("check.sh");
    std::fs::write(&script, "#!/bin/sh\necho \"hi $CONTAINER_NAME\"\n")
      .unwrap();
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
        .unwrap();
    }

    let executor = ScriptExecutor::new(&dir);
    let outcome = executor.run("check.sh", "web", &[]).await.unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.output.contains("hi web"));

    std::fs::remove_dir_all(&dir).ok();
  }
}
