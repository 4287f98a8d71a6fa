use std::path::{Path, PathBuf};

/// Resolution order per spec's §4.3 addendum: explicit `env_file:` entries
/// for the service first, then the conventional `.env` beside the compose
/// file.
pub fn resolve_env_file(
  compose_dir: &Path,
  service_env_files: &[String],
) -> PathBuf {
  service_env_files
    .first()
    .map(|p| {
      let pb = Path::new(p);
      if pb.is_absolute() { pb.to_path_buf() } else { compose_dir.join(pb) }
    })
    .unwrap_or_else(|| compose_dir.join(".env"))
}

/// Rewrites `KEY=value` (or `KEY="value"`) to `KEY=new_value`, preserving
/// every other line - including comments and blank lines - byte for byte.
/// Appends the assignment if the key isn't present.
pub fn set_var(source: &str, key: &str, new_value: &str) -> String {
  let mut found = false;
  let mut out = String::with_capacity(source.len() + new_value.len());

  for line in source.lines() {
    let trimmed = line.trim_start();
    if !found
      && !trimmed.starts_with('#')
      && trimmed
        .split_once('=')
        .map(|(k, _)| k.trim() == key)
        .unwrap_or(false)
    {
      found = true;
      let indent_len = line.len() - trimmed.len();
      out.push_str(&line[..indent_len]);
      out.push_str(key);
      out.push('=');
      out.push_str(new_value);
    } else {
      out.push_str(line);
    }
    out.push('\n');
  }

  if !found {
    if !out.is_empty() && !out.ends_with('\n') {
      out.push('\n');
    }
    out.push_str(key);
    out.push('=');
    out.push_str(new_value);
    out.push('\n');
  }

  if !source.ends_with('\n') && out.ends_with('\n') {
    out.pop();
  }
  out
}

/// Reads the current value of `key` from a `.env`-formatted string.
pub fn get_var(source: &str, key: &str) -> Option<String> {
  source.lines().find_map(|line| {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
      return None;
    }
    let (k, v) = trimmed.split_once('=')?;
    if k.trim() == key { Some(v.trim().to_string()) } else { None }
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn updates_existing_var_preserving_comments() {
    let source = "# top comment\nNGINX_VERSION=1.24\n\nOTHER=1\n";
    let updated = set_var(source, "NGINX_VERSION", "1.25");
    assert_eq!(
      updated,
      "# top comment\nNGINX_VERSION=1.25\n\nOTHER=1\n"
    );
  }

  #[test]
  fn appends_missing_var() {
    let source = "OTHER=1\n";
    let updated = set_var(source, "NGINX_VERSION", "1.25");
    assert_eq!(updated, "OTHER=1\nNGINX_VERSION=1.25\n");
  }

  #[test]
  fn get_var_ignores_commented_lines() {
    let source = "# NGINX_VERSION=9.9\nNGINX_VERSION=1.24\n";
    assert_eq!(get_var(source, "NGINX_VERSION").as_deref(), Some("1.24"));
  }
}
