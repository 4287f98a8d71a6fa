//! Version parsing and comparison (spec §4.2).
//!
//! `Version` is a discriminated type: semantic, date, numeric, sha, or
//! opaque. Equality and ordering are only meaningful within a variant -
//! [`Version::compare`] refuses to compare across variants.

mod comparator;
mod parser;

pub use comparator::{
  ChangeType, compare, get_change_type, is_newer, select_candidate,
};
pub use parser::{parse_image_tag, parse_tag};

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Semantic {
  pub major: u64,
  pub minor: u64,
  pub patch: u64,
  pub prerelease: Option<String>,
  pub build: Option<String>,
}

impl Semantic {
  pub fn is_stable(&self) -> bool {
    self.prerelease.is_none()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateVersion {
  pub year: i32,
  pub month: u32,
  pub day: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Version {
  Semantic(Semantic),
  Date(DateVersion),
  /// Dotted, purely-numeric tag that did not parse as semantic
  /// (e.g. `2024.11` or a 4-part build number).
  Numeric(Vec<u64>),
  /// Hex digest or digest-prefixed tag (`sha256:...` or a bare hex run of
  /// 7-64 characters).
  Sha(String),
  /// Anything else - compared only for equality, via the raw string.
  Opaque(String),
}

impl Version {
  pub fn type_name(&self) -> &'static str {
    match self {
      Version::Semantic(_) => "semantic",
      Version::Date(_) => "date",
      Version::Numeric(_) => "numeric",
      Version::Sha(_) => "sha",
      Version::Opaque(_) => "opaque",
    }
  }

  pub fn is_stable(&self) -> bool {
    match self {
      Version::Semantic(s) => s.is_stable(),
      _ => true,
    }
  }

  /// Total order within a variant. `None` when `self` and `other` are
  /// different variants - cross-type comparison is undefined per spec §3.
  pub fn compare(&self, other: &Self) -> Option<Ordering> {
    match (self, other) {
      (Version::Semantic(a), Version::Semantic(b)) => {
        Some(compare_semantic(a, b))
      }
      (Version::Date(a), Version::Date(b)) => Some(
        (a.year, a.month, a.day).cmp(&(b.year, b.month, b.day)),
      ),
      (Version::Numeric(a), Version::Numeric(b)) => {
        Some(compare_numeric(a, b))
      }
      (Version::Sha(a), Version::Sha(b)) => Some(a.cmp(b)),
      (Version::Opaque(a), Version::Opaque(b)) => Some(a.cmp(b)),
      _ => None,
    }
  }
}

fn compare_numeric(a: &[u64], b: &[u64]) -> Ordering {
  for (x, y) in a.iter().zip(b.iter()) {
    match x.cmp(y) {
      Ordering::Equal => continue,
      other => return other,
    }
  }
  a.len().cmp(&b.len())
}

fn compare_semantic(a: &Semantic, b: &Semantic) -> Ordering {
  let core = (a.major, a.minor, a.patch)
    .cmp(&(b.major, b.minor, b.patch));
  if core != Ordering::Equal {
    return core;
  }
  match (&a.prerelease, &b.prerelease) {
    (None, None) => Ordering::Equal,
    // A release without a prerelease tag outranks one with, per semver.
    (None, Some(_)) => Ordering::Greater,
    (Some(_), None) => Ordering::Less,
    (Some(x), Some(y)) => compare_prerelease(x, y),
  }
}

/// Semver prerelease comparison: dot-separated identifiers compared
/// numerically when both are numeric, lexically otherwise; shorter
/// identifier lists with a matching prefix sort lower.
fn compare_prerelease(a: &str, b: &str) -> Ordering {
  let a_parts: Vec<&str> = a.split('.').collect();
  let b_parts: Vec<&str> = b.split('.').collect();
  for (x, y) in a_parts.iter().zip(b_parts.iter()) {
    let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
      (Ok(x), Ok(y)) => x.cmp(&y),
      (Ok(_), Err(_)) => Ordering::Less,
      (Err(_), Ok(_)) => Ordering::Greater,
      (Err(_), Err(_)) => x.cmp(y),
    };
    if ord != Ordering::Equal {
      return ord;
    }
  }
  a_parts.len().cmp(&b_parts.len())
}

/// Flavor suffix captured alongside a version (`-slim`, `-alpine`, ...).
pub type Suffix = Option<String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
  pub tag: String,
  pub version: Version,
  pub is_versioned: bool,
  pub suffix: Suffix,
}

impl TagInfo {
  /// Per spec §3: two tags are comparable for update iff same version
  /// type, same suffix, and (if the current is stable) the candidate is
  /// also stable.
  pub fn comparable_for_update(&self, candidate: &TagInfo) -> bool {
    if self.version.type_name() != candidate.version.type_name() {
      return false;
    }
    if self.suffix != candidate.suffix {
      return false;
    }
    if self.version.is_stable() && !candidate.version.is_stable() {
      return false;
    }
    true
  }
}
