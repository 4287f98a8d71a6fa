use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operation::OperationId;

/// Content snapshot of a compose file (and `.env` when relevant) taken
/// before mutation (spec §3). Backups are named
/// `.{base}.backup.{YYYYMMDD-HHMMSS}` next to the source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeBackup {
  pub operation_id: OperationId,
  pub container_name: String,
  pub stack_name: String,
  pub compose_file_path: String,
  pub backup_file_path: String,
  pub backup_timestamp: DateTime<Utc>,
  /// Present when an `.env` file was also snapshotted alongside the
  /// compose file for this operation.
  pub env_backup_file_path: Option<String>,
}

impl ComposeBackup {
  pub fn backup_suffix(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d-%H%M%S").to_string()
  }

  /// `.{base}.backup.{YYYYMMDD-HHMMSS}` in the same directory as `path`.
  pub fn backup_path_for(
    path: &std::path::Path,
    ts: DateTime<Utc>,
  ) -> std::path::PathBuf {
    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let base = path
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_default();
    dir.join(format!(".{base}.backup.{}", Self::backup_suffix(ts)))
  }
}
