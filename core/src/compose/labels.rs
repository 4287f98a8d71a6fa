use indexmap::IndexMap;

use super::ServiceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelsForm {
  Sequence,
  Mapping,
}

/// Reads the `labels:` block of a service, detecting which form it's
/// authored in so `write_labels` can preserve it (spec §4.3).
pub fn read_labels(
  source: &str,
  location: &ServiceLocation,
) -> Option<(LabelsForm, IndexMap<String, String>, usize, usize)> {
  let lines: Vec<&str> = source.lines().collect();
  let block_indent = location.indent + 2;

  let header_idx = (location.body_start..location.body_end).find(|&i| {
    let l = lines.get(i).copied().unwrap_or("");
    indent_of(l) == block_indent && l.trim().starts_with("labels:")
  })?;

  let header = lines[header_idx].trim();
  let inline_map = header.trim_start_matches("labels:").trim();

  if !inline_map.is_empty() && inline_map != "{}" {
    // `labels: {KEY: value, ...}` flow mapping - rare but spec-legal;
    // treated as a single-line mapping form for round-trip purposes.
    let mut map = IndexMap::new();
    for pair in inline_map.trim_matches(['{', '}']).split(',') {
      if let Some((k, v)) = pair.split_once(':') {
        map.insert(k.trim().to_string(), v.trim().to_string());
      }
    }
    return Some((LabelsForm::Mapping, map, header_idx, header_idx + 1));
  }

  let child_indent = (header_idx + 1..location.body_end)
    .find(|&i| !is_blank_or_comment(lines.get(i).copied().unwrap_or("")))
    .map(|i| indent_of(lines[i]));

  let Some(child_indent) = child_indent else {
    return Some((
      LabelsForm::Mapping,
      IndexMap::new(),
      header_idx,
      header_idx + 1,
    ));
  };

  let mut end = header_idx + 1;
  while end < location.body_end {
    let l = lines.get(end).copied().unwrap_or("");
    if is_blank_or_comment(l) {
      end += 1;
      continue;
    }
    if indent_of(l) < child_indent {
      break;
    }
    end += 1;
  }

  let first_child = lines[(header_idx + 1..end)
    .find(|&i| !is_blank_or_comment(lines[i]))
    .unwrap()];
  let is_sequence = first_child.trim_start().starts_with("- ");

  let mut map = IndexMap::new();
  for &line in &lines[header_idx + 1..end] {
    if is_blank_or_comment(line) {
      continue;
    }
    let trimmed = line.trim();
    let kv = if is_sequence {
      trimmed.trim_start_matches("- ").trim()
    } else {
      trimmed
    };
    let kv = kv.trim_matches('"').trim_matches('\'');
    if let Some((k, v)) = kv.split_once(['=', ':']) {
      map.insert(k.trim().to_string(), v.trim().to_string());
    }
  }

  let form = if is_sequence {
    LabelsForm::Sequence
  } else {
    LabelsForm::Mapping
  };
  Some((form, map, header_idx, end))
}

/// Rewrites the `labels:` block, preserving the original form. An empty
/// result removes the block entirely (spec §4.3).
pub fn write_labels(
  source: &str,
  location: &ServiceLocation,
  form: LabelsForm,
  labels: &IndexMap<String, String>,
  header_idx: usize,
  end_idx: usize,
) -> String {
  let lines: Vec<&str> = source.lines().collect();
  let block_indent = " ".repeat(location.indent + 2);
  let item_indent = " ".repeat(location.indent + 4);

  let write_block = |out: &mut String| {
    out.push_str(&block_indent);
    out.push_str("labels:\n");
    for (k, v) in labels {
      match form {
        LabelsForm::Sequence => {
          out.push_str(&item_indent);
          out.push_str(&format!("- {k}={v}\n"));
        }
        LabelsForm::Mapping => {
          out.push_str(&item_indent);
          out.push_str(&format!("{k}: {v}\n"));
        }
      }
    }
  };

  let mut out = String::with_capacity(source.len());
  for (i, line) in lines.iter().enumerate() {
    // `header_idx == end_idx` means there's no existing block to
    // replace - splice the new one in right before this line.
    if i == header_idx && header_idx == end_idx && !labels.is_empty() {
      write_block(&mut out);
    }
    if i < header_idx || i >= end_idx {
      out.push_str(line);
      out.push('\n');
      continue;
    }
    if i != header_idx {
      continue; // skip old body lines, rewritten below
    }
    if labels.is_empty() {
      continue; // drop the labels: block entirely
    }
    write_block(&mut out);
  }
  if header_idx == end_idx && header_idx >= lines.len() && !labels.is_empty() {
    write_block(&mut out);
  }
  if !source.ends_with('\n') && out.ends_with('\n') {
    out.pop();
  }
  out
}

fn indent_of(line: &str) -> usize {
  line.len() - line.trim_start().len()
}

fn is_blank_or_comment(line: &str) -> bool {
  let t = line.trim();
  t.is_empty() || t.starts_with('#')
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compose::ComposeDocument;
  use std::path::Path;

  #[test]
  fn reads_sequence_form_labels() {
    let source = "services:\n  web:\n    labels:\n      - docksmith.ignore=false\n      - app=web\n    image: nginx:1.24\n";
    let doc = ComposeDocument::parse(
      Path::new("docker-compose.yml"),
      source.to_string(),
    )
    .unwrap();
    let loc = doc.find_service("web").unwrap();
    let (form, map, _, _) = read_labels(source, &loc).unwrap();
    assert_eq!(form, LabelsForm::Sequence);
    assert_eq!(map.get("app").map(String::as_str), Some("web"));
  }

  #[test]
  fn reads_mapping_form_labels() {
    let source = "services:\n  web:\n    labels:\n      app: web\n    image: nginx:1.24\n";
    let doc = ComposeDocument::parse(
      Path::new("docker-compose.yml"),
      source.to_string(),
    )
    .unwrap();
    let loc = doc.find_service("web").unwrap();
    let (form, map, _, _) = read_labels(source, &loc).unwrap();
    assert_eq!(form, LabelsForm::Mapping);
    assert_eq!(map.get("app").map(String::as_str), Some("web"));
  }
}
