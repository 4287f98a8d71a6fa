use std::path::{Path, PathBuf};

use crate::{
  compose::{self, ComposeDocument, ComposeError, ServiceLocation},
  error::{AppError, AppResult, ErrorKind},
  model::Container,
};

/// Everything the orchestrator needs to mutate and recreate a service:
/// the document that actually declares it (which may be an `include:`
/// target, not the primary file) plus the primary file and project
/// directory `docker compose` itself is invoked against.
pub struct ComposeTarget {
  pub doc: ComposeDocument,
  pub location: ServiceLocation,
  pub primary_compose_path: PathBuf,
  pub host_project_dir: PathBuf,
  pub service: String,
}

/// Resolves the compose file, include target, and project directory for
/// `container` (spec §4.9's "locate compose service" step). Assumes the
/// manager sees the same path the daemon reports in the
/// `project.config_files` label - the common bind-mount-at-identical-path
/// deployment; `DockerFacade::ensure_host_path_symlink` covers the rarer
/// divergent-path case at recreate time.
pub fn resolve(container: &Container) -> AppResult<ComposeTarget> {
  let paths = container.compose_file_paths();
  let primary = paths.first().ok_or_else(|| {
    AppError::new(
      ErrorKind::NoComposeFile,
      anyhow::anyhow!(
        "container {} has no compose project labels",
        container.name
      ),
    )
  })?;
  let primary_compose_path = PathBuf::from(primary);
  let service = container.service.clone().unwrap_or_else(|| container.name.clone());

  let (doc, location) =
    compose::resolve_service_file(&primary_compose_path, &service)
      .map_err(to_app_error)?;

  let host_project_dir = container
    .working_dir()
    .map(PathBuf::from)
    .or_else(|| {
      primary_compose_path.parent().map(Path::to_path_buf)
    })
    .unwrap_or_else(|| PathBuf::from("."));

  Ok(ComposeTarget { doc, location, primary_compose_path, host_project_dir, service })
}

pub fn to_app_error(e: ComposeError) -> AppError {
  match e {
    ComposeError::ServiceNotFound(_) | ComposeError::NoComposeFile => {
      AppError::new(ErrorKind::NoComposeFile, anyhow::Error::new(e))
    }
    ComposeError::Io { .. }
    | ComposeError::Yaml { .. }
    | ComposeError::NoImageKey(_) => {
      AppError::new(ErrorKind::ComposeParseError, anyhow::Error::new(e))
    }
  }
}
