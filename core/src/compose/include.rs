use std::path::{Path, PathBuf};

use yaml_rust2::Yaml;

use super::{ComposeDocument, ComposeError, ServiceLocation};

/// `include:` accepts either a bare path string or a mapping with a
/// `path:` key (and optional `project_directory:`, `env_file:` - not
/// needed for service resolution).
pub fn extract_include_paths(yaml: &Yaml) -> Vec<String> {
  match &yaml["include"] {
    Yaml::Array(items) => items
      .iter()
      .filter_map(|item| match item {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Hash(_) => item["path"].as_str().map(str::to_string),
        _ => None,
      })
      .collect(),
    _ => vec![],
  }
}

/// Resolves which file (the primary, or one of its `include:` targets)
/// contains `service_name`, loading recursively. Per spec §4.3, only the
/// file that actually defines the service is returned for mutation.
pub fn resolve_service_file(
  primary_path: &Path,
  service_name: &str,
) -> Result<(ComposeDocument, ServiceLocation), ComposeError> {
  let primary = ComposeDocument::load(primary_path)?;

  if primary.has_services_block() {
    if let Some(loc) = primary.find_service(service_name) {
      return Ok((primary, loc));
    }
  }

  let dir = primary_path.parent().unwrap_or_else(|| Path::new("."));
  for include in primary.include_paths() {
    let included_path = resolve_relative(dir, &include);
    if let Ok((doc, loc)) =
      resolve_service_file(&included_path, service_name)
    {
      return Ok((doc, loc));
    }
  }

  Err(ComposeError::ServiceNotFound(service_name.to_string()))
}

fn resolve_relative(base: &Path, path: &str) -> PathBuf {
  let p = Path::new(path);
  if p.is_absolute() { p.to_path_buf() } else { base.join(p) }
}
