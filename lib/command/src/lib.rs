use std::{path::Path, process::Stdio, time::Duration};

mod output;

pub use output::*;
use nix::{
  sys::signal::{self, Signal},
  unistd::Pid,
};
use tokio::process::Command;

/// Grace period between SIGTERM and SIGKILL when a command
/// is cancelled or times out.
pub const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Runs `program` with `args` directly (no shell), waiting up to `timeout`.
///
/// On timeout, sends SIGTERM to the child and waits up to
/// [`KILL_GRACE_PERIOD`] before escalating to SIGKILL.
pub async fn run_command_with_timeout(
  program: &str,
  args: &[String],
  cwd: Option<&Path>,
  envs: &[(String, String)],
  timeout: Duration,
) -> CommandOutput {
  let mut cmd = Command::new(program);
  cmd
    .args(args)
    .kill_on_drop(true)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  for (k, v) in envs {
    cmd.env(k, v);
  }

  if let Some(cwd) = cwd {
    cmd.current_dir(cwd);
  }

  let mut child = match cmd.spawn() {
    Ok(child) => child,
    Err(e) => return CommandOutput::from_err(e),
  };
  let pid = child.id().map(|id| id as i32);

  match tokio::time::timeout(timeout, child.wait_with_output()).await {
    Ok(output) => CommandOutput::from(output),
    Err(_) => {
      // Timed out: escalate SIGTERM -> grace period -> SIGKILL.
      if let Some(pid) = pid {
        let _ = signal::kill(Pid::from_raw(pid), Signal::SIGTERM);
        tokio::time::sleep(KILL_GRACE_PERIOD).await;
        let _ = signal::kill(Pid::from_raw(pid), Signal::SIGKILL);
      }
      CommandOutput::timed_out()
    }
  }
}

/// Runs `program` with `args` directly (no shell), with no deadline other
/// than the caller's own cancellation of the returned future.
pub async fn run_command(
  program: &str,
  args: &[String],
  cwd: Option<&Path>,
  envs: &[(String, String)],
) -> CommandOutput {
  let mut cmd = Command::new(program);
  cmd
    .args(args)
    .kill_on_drop(true)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  for (k, v) in envs {
    cmd.env(k, v);
  }

  if let Some(cwd) = cwd {
    cmd.current_dir(cwd);
  }

  CommandOutput::from(cmd.output().await)
}

/// Runs a script file directly (not through a shell), passing `envs` and
/// enforcing `timeout`. Used by the script executor (spec §4.11).
pub async fn run_script_with_timeout(
  script_path: &Path,
  envs: &[(String, String)],
  timeout: Duration,
) -> CommandOutput {
  run_command_with_timeout(
    &script_path.to_string_lossy(),
    &[],
    script_path.parent(),
    envs,
    timeout,
  )
  .await
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn runs_and_captures_stdout() {
    let out =
      run_command("/bin/echo", &["hello".to_string()], None, &[]).await;
    assert!(out.success());
    assert_eq!(out.stdout.trim(), "hello");
  }

  #[tokio::test]
  async fn times_out_and_is_killed() {
    let out = run_command_with_timeout(
      "/bin/sleep",
      &["5".to_string()],
      None,
      &[],
      Duration::from_millis(100),
    )
    .await;
    assert!(!out.success());
    assert_eq!(out.exit_code(), 124);
  }
}
