use std::path::{Path, PathBuf};

use yaml_rust2::{Yaml, YamlLoader};

use super::ComposeError;

/// A loaded compose file: raw source text plus the parsed YAML tree used
/// for structural lookups.
pub struct ComposeDocument {
  pub path: PathBuf,
  pub source: String,
  pub yaml: Yaml,
}

/// Located span of a service block within `source`, in 0-indexed line
/// numbers. `body_end` is exclusive.
#[derive(Debug, Clone)]
pub struct ServiceLocation {
  pub service_key: String,
  pub indent: usize,
  pub header_line: usize,
  pub body_start: usize,
  pub body_end: usize,
}

/// What kind of edit `set_image_tag` performed.
#[derive(Debug, Clone)]
pub enum ImageMutation {
  /// The `image:` scalar was rewritten in place.
  Inline { new_source: String },
  /// The tag is an `${ENV}` reference; the `.env` file must be edited
  /// instead. Caller resolves the var name and env file path.
  EnvReference { var_name: String },
}

impl ComposeDocument {
  pub fn load(path: &Path) -> Result<Self, ComposeError> {
    let source =
      std::fs::read_to_string(path).map_err(|source| ComposeError::Io {
        path: path.to_path_buf(),
        source,
      })?;
    Self::parse(path, source)
  }

  pub fn parse(
    path: &Path,
    source: String,
  ) -> Result<Self, ComposeError> {
    let docs = YamlLoader::load_from_str(&source).map_err(|source| {
      ComposeError::Yaml { path: path.to_path_buf(), source }
    })?;
    let yaml = docs.into_iter().next().unwrap_or(Yaml::Null);
    Ok(ComposeDocument { path: path.to_path_buf(), source, yaml })
  }

  pub fn has_services_block(&self) -> bool {
    !matches!(self.yaml["services"], Yaml::BadValue | Yaml::Null)
  }

  pub fn service_names(&self) -> Vec<String> {
    match self.yaml["services"].as_hash() {
      Some(hash) => hash
        .keys()
        .filter_map(|k| k.as_str().map(str::to_string))
        .collect(),
      None => vec![],
    }
  }

  pub fn include_paths(&self) -> Vec<String> {
    super::include::extract_include_paths(&self.yaml)
  }

  /// Locates the service matching `name` either by an explicit
  /// `container_name:` value or by service key (spec §4.3).
  pub fn find_service(
    &self,
    name: &str,
  ) -> Option<ServiceLocation> {
    let services_header = find_top_level_key(&self.source, "services")?;
    let service_indent = first_child_indent(
      &self.source,
      services_header,
    )?;

    let blocks =
      service_blocks(&self.source, services_header, service_indent);

    // Prefer an explicit container_name match, per spec §4.3.
    for block in &blocks {
      if let Some(container_name) = scan_scalar_key(
        &self.source,
        block.body_start,
        block.body_end,
        "container_name",
      ) {
        if container_name == name {
          return Some(block.clone());
        }
      }
    }
    blocks.into_iter().find(|b| b.service_key == name)
  }

  /// Service's `env_file:` entries, bare scalar or sequence form. Empty
  /// when the key is absent.
  pub fn env_file_paths(&self, location: &ServiceLocation) -> Vec<String> {
    let lines: Vec<&str> = self.source.lines().collect();
    let block_indent = location.indent + 2;

    let Some(header_idx) =
      (location.body_start..location.body_end).find(|&i| {
        let l = lines.get(i).copied().unwrap_or("");
        indent_of(l) == block_indent && l.trim().starts_with("env_file:")
      })
    else {
      return vec![];
    };

    let header = lines[header_idx].trim();
    let inline = header.trim_start_matches("env_file:").trim();
    if !inline.is_empty() {
      return vec![inline.trim_matches('"').trim_matches('\'').to_string()];
    }

    let mut out = Vec::new();
    let mut i = header_idx + 1;
    while i < location.body_end {
      let l = lines.get(i).copied().unwrap_or("");
      if is_blank_or_comment(l) {
        i += 1;
        continue;
      }
      if indent_of(l) <= block_indent {
        break;
      }
      let item = l
        .trim()
        .trim_start_matches("- ")
        .trim()
        .trim_matches('"')
        .trim_matches('\'');
      if !item.is_empty() {
        out.push(item.to_string());
      }
      i += 1;
    }
    out
  }

  /// Rewrites the tag segment of the service's `image:` scalar, or
  /// reports that it's an `${ENV}` reference needing `.env` mutation.
  pub fn set_image_tag(
    &self,
    location: &ServiceLocation,
    new_tag: &str,
  ) -> Result<ImageMutation, ComposeError> {
    let (line_idx, value) = find_scalar_line(
      &self.source,
      location.body_start,
      location.body_end,
      "image",
    )
    .ok_or_else(|| {
      ComposeError::NoImageKey(location.service_key.clone())
    })?;

    let trimmed = value.trim();
    if let Some(var) = env_var_reference(trimmed) {
      return Ok(ImageMutation::EnvReference { var_name: var });
    }

    let new_value = rewrite_tag(trimmed, new_tag);
    let lines: Vec<&str> = self.source.lines().collect();
    let mut out = String::with_capacity(self.source.len());
    for (i, line) in lines.iter().enumerate() {
      if i == line_idx {
        let indent_len = line.len() - line.trim_start().len();
        let indent = &line[..indent_len];
        out.push_str(indent);
        out.push_str("image: ");
        out.push_str(&new_value);
      } else {
        out.push_str(line);
      }
      out.push('\n');
    }
    if !self.source.ends_with('\n') {
      out.pop();
    }
    Ok(ImageMutation::Inline { new_source: out })
  }
}

/// `${VAR}` or `${VAR:-default}` fully replacing the tag segment of the
/// value, or the value as a whole referencing an env var.
fn env_var_reference(value: &str) -> Option<String> {
  // Only the tag position is relevant: `repo:${TAG}` or a bare `${TAG}`.
  let tag_part = value.rsplit_once(':').map(|(_, t)| t).unwrap_or(value);
  let tag_part = tag_part.trim();
  let inner = tag_part.strip_prefix("${")?.strip_suffix('}')?;
  let name = inner.split(":-").next().unwrap_or(inner);
  Some(name.trim().to_string())
}

fn rewrite_tag(current: &str, new_tag: &str) -> String {
  let value = current.trim_matches('"').trim_matches('\'');
  match value.rfind(':') {
    Some(idx) if !value[idx + 1..].contains('/') => {
      format!("{}:{new_tag}", &value[..idx])
    }
    _ => format!("{value}:{new_tag}"),
  }
}

fn find_top_level_key(source: &str, key: &str) -> Option<usize> {
  source.lines().position(|line| {
    !line.starts_with(' ')
      && !line.starts_with('\t')
      && line.trim_end().trim_end_matches(':') == key
      && line.trim_end().ends_with(':')
  })
}

fn indent_of(line: &str) -> usize {
  line.len() - line.trim_start().len()
}

fn is_blank_or_comment(line: &str) -> bool {
  let t = line.trim();
  t.is_empty() || t.starts_with('#')
}

fn first_child_indent(source: &str, header_line: usize) -> Option<usize> {
  source
    .lines()
    .skip(header_line + 1)
    .find(|l| !is_blank_or_comment(l))
    .map(indent_of)
}

/// Splits the `services:` block into per-service spans at `child_indent`.
fn service_blocks(
  source: &str,
  header_line: usize,
  child_indent: usize,
) -> Vec<ServiceLocation> {
  let lines: Vec<&str> = source.lines().collect();
  let mut blocks = Vec::new();
  let mut i = header_line + 1;

  while i < lines.len() {
    let line = lines[i];
    if is_blank_or_comment(line) {
      i += 1;
      continue;
    }
    let indent = indent_of(line);
    if indent < child_indent {
      break;
    }
    if indent == child_indent {
      let key = line.trim().trim_end_matches(':').trim_matches('"').trim_matches('\'').to_string();
      let body_start = i + 1;
      let mut j = body_start;
      while j < lines.len() {
        if is_blank_or_comment(lines[j]) {
          j += 1;
          continue;
        }
        if indent_of(lines[j]) <= child_indent {
          break;
        }
        j += 1;
      }
      blocks.push(ServiceLocation {
        service_key: key,
        indent: child_indent,
        header_line: i,
        body_start,
        body_end: j,
      });
      i = j;
    } else {
      i += 1;
    }
  }
  blocks
}

fn scan_scalar_key(
  source: &str,
  start: usize,
  end: usize,
  key: &str,
) -> Option<String> {
  find_scalar_line(source, start, end, key).map(|(_, v)| {
    v.trim().trim_matches('"').trim_matches('\'').to_string()
  })
}

/// Finds the line within `[start, end)` whose trimmed text is
/// `{key}: value`, returning its index and the raw value text. Only scans
/// the direct child level of the block (the first line's indent), so a
/// nested map that happens to reuse the key name isn't matched.
fn find_scalar_line<'a>(
  source: &'a str,
  start: usize,
  end: usize,
  key: &str,
) -> Option<(usize, &'a str)> {
  let lines: Vec<&str> = source.lines().collect();
  let block_indent = (start..end)
    .find(|&i| !is_blank_or_comment(lines.get(i).copied().unwrap_or("")))
    .map(|i| indent_of(lines[i]))?;

  for i in start..end.min(lines.len()) {
    let line = lines[i];
    if is_blank_or_comment(line) || indent_of(line) != block_indent {
      continue;
    }
    let trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix(&format!("{key}:")) {
      return Some((i, rest));
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  fn doc(yaml: &str) -> ComposeDocument {
    ComposeDocument::parse(Path::new("docker-compose.yml"), yaml.to_string())
      .unwrap()
  }

  #[test]
  fn finds_service_by_key() {
    let d = doc(
      "services:\n  web:\n    image: nginx:1.24\n  db:\n    image: postgres:15\n",
    );
    let loc = d.find_service("web").unwrap();
    assert_eq!(loc.service_key, "web");
  }

  #[test]
  fn finds_service_by_explicit_container_name() {
    let d = doc(
      "services:\n  web:\n    container_name: my-web\n    image: nginx:1.24\n",
    );
    let loc = d.find_service("my-web").unwrap();
    assert_eq!(loc.service_key, "web");
  }

  #[test]
  fn rewrites_image_tag_preserving_comments() {
    let source = "services:\n  web:\n    # pinned for compat\n    image: nginx:1.24\n    restart: unless-stopped\n";
    let d = doc(source);
    let loc = d.find_service("web").unwrap();
    let mutation = d.set_image_tag(&loc, "1.25").unwrap();
    match mutation {
      ImageMutation::Inline { new_source } => {
        assert!(new_source.contains("# pinned for compat"));
        assert!(new_source.contains("image: nginx:1.25"));
        assert!(new_source.contains("restart: unless-stopped"));
      }
      _ => panic!("expected inline mutation"),
    }
  }

  #[test]
  fn detects_env_reference() {
    let source = "services:\n  web:\n    image: nginx:${NGINX_VERSION}\n";
    let d = doc(source);
    let loc = d.find_service("web").unwrap();
    let mutation = d.set_image_tag(&loc, "1.25").unwrap();
    match mutation {
      ImageMutation::EnvReference { var_name } => {
        assert_eq!(var_name, "NGINX_VERSION");
      }
      _ => panic!("expected env reference"),
    }
  }

  #[test]
  fn no_edit_round_trips_byte_identical() {
    let source = "services:\n  web:\n    image: nginx:1.24\n";
    let d = doc(source);
    assert_eq!(d.source, source);
  }
}
