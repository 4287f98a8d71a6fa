//! Compose-file mutation engine (spec §4.3): comment-preserving YAML
//! editing, `include:` resolution, and `.env`-reference updates.
//!
//! Structural lookups (locating `services:`, walking `include:`) go
//! through a real YAML parse (`yaml-rust2`); the actual mutation is a
//! line-scoped text patch so everything the parser doesn't model -
//! comments, blank lines, key order, quoting style - survives untouched.
//! A plain map-based loader can answer "does this service exist" but not
//! "what byte range is its `image:` value", which is what the patch needs.

mod backup;
mod engine;
pub(crate) mod env_file;
mod include;
mod labels;

pub use backup::{BackupPair, restore_backup, take_backup};
pub use engine::{ComposeDocument, ImageMutation, ServiceLocation};
pub use include::resolve_service_file;
pub use labels::{LabelsForm, read_labels, write_labels};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComposeError {
  #[error("failed to read compose file {path}: {source}")]
  Io { path: PathBuf, #[source] source: std::io::Error },
  #[error("failed to parse compose YAML at {path}: {source}")]
  Yaml { path: PathBuf, #[source] source: yaml_rust2::ScanError },
  #[error("service '{0}' not found in compose file")]
  ServiceNotFound(String),
  #[error("no 'image:' key found for service '{0}'")]
  NoImageKey(String),
  #[error("no compose file declares 'services:' or resolvable 'include:'")]
  NoComposeFile,
}
