use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::model::ComposeBackup;

/// The on-disk paths of a backup taken before mutation.
#[derive(Debug, Clone)]
pub struct BackupPair {
  pub original: PathBuf,
  pub backup: PathBuf,
}

/// Copies `path` to `.{base}.backup.{YYYYMMDD-HHMMSS}` in the same
/// directory (spec §4.3/§6). Byte-for-byte; the copy is the backup
/// format.
pub fn take_backup(path: &Path) -> std::io::Result<BackupPair> {
  let backup_path = ComposeBackup::backup_path_for(path, Utc::now());
  std::fs::copy(path, &backup_path)?;
  Ok(BackupPair { original: path.to_path_buf(), backup: backup_path })
}

/// Restores `pair.original` from `pair.backup`, byte-for-byte (spec §8's
/// rollback idempotence property).
pub fn restore_backup(pair: &BackupPair) -> std::io::Result<()> {
  std::fs::copy(&pair.backup, &pair.original)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backup_path_uses_hidden_dotfile_convention() {
    let path = Path::new("/stacks/web/docker-compose.yml");
    let ts = Utc::now();
    let backup = ComposeBackup::backup_path_for(path, ts);
    let name = backup.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with(".docker-compose.yml.backup."));
  }
}
