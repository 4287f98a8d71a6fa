use super::{TagInfo, Version};
use crate::model::policy::Policy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ChangeType {
  Major,
  Minor,
  Patch,
  Prerelease,
  NoChange,
  Unknown,
}

/// `isNewer(a, b)`: does `b` represent a move forward from `a`? Requires
/// same variant; returns `false` (not an error) across types, matching
/// spec §4.2's note that cross-type comparison is undefined and must be
/// refused rather than guessed at.
pub fn is_newer(a: &Version, b: &Version) -> bool {
  matches!(a.compare(b), Some(std::cmp::Ordering::Less))
}

pub fn compare(a: &Version, b: &Version) -> Option<std::cmp::Ordering> {
  a.compare(b)
}

/// `getChangeType(a, b)`.
pub fn get_change_type(a: &Version, b: &Version) -> ChangeType {
  if a == b {
    return ChangeType::NoChange;
  }
  match (a, b) {
    (Version::Semantic(a), Version::Semantic(b)) => {
      if a.major != b.major {
        ChangeType::Major
      } else if a.minor != b.minor {
        ChangeType::Minor
      } else if a.patch != b.patch {
        ChangeType::Patch
      } else if a.prerelease != b.prerelease {
        ChangeType::Prerelease
      } else {
        ChangeType::NoChange
      }
    }
    _ if a.type_name() == b.type_name() => ChangeType::Unknown,
    _ => ChangeType::Unknown,
  }
}

/// Applies the filtering rule of spec §4.2 to select an update candidate
/// from the set of tags the registry reported, given the current tag and
/// the container's policy labels. Returns `None` when nothing beats the
/// current version (current version is already "latest").
pub fn select_candidate<'a>(
  current: &TagInfo,
  candidates: &'a [TagInfo],
  policy: &Policy,
) -> Option<&'a TagInfo> {
  let mut pool: Vec<&TagInfo> = candidates
    .iter()
    // 1. Same version type and suffix as current.
    .filter(|c| current.comparable_for_update(c))
    .collect();

  // 2. Already enforced by `comparable_for_update` (stable current
  // rejects unstable candidates), kept explicit for readability.
  if current.version.is_stable() {
    pool.retain(|c| c.version.is_stable());
  }

  // 3. tag-regex must fully match.
  if let Some(re) = &policy.tag_regex {
    pool.retain(|c| re.is_match(&c.tag));
  }

  // 4. version-min / version-max / pin-major / pin-minor bounds.
  if let Version::Semantic(cur) = &current.version {
    if policy.version_pin_major {
      pool.retain(|c| match &c.version {
        Version::Semantic(s) => s.major == cur.major,
        _ => false,
      });
    }
    if policy.version_pin_minor {
      pool.retain(|c| match &c.version {
        Version::Semantic(s) => {
          s.major == cur.major && s.minor == cur.minor
        }
        _ => false,
      });
    }
  }
  if let Some(min) = &policy.version_min {
    pool.retain(|c| {
      matches!(
        c.version.compare(min),
        Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
      )
    });
  }
  if let Some(max) = &policy.version_max {
    pool.retain(|c| {
      matches!(
        c.version.compare(max),
        Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
      )
    });
  }

  // 5. Pick the maximum; deterministic tie-break on tag string.
  pool.into_iter().max_by(|a, b| {
    match a.version.compare(&b.version) {
      Some(ord) => ord.then_with(|| a.tag.cmp(&b.tag)),
      None => a.tag.cmp(&b.tag),
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::version::parser::parse_image_tag;

  fn tags(list: &[&str]) -> Vec<TagInfo> {
    list.iter().map(|t| parse_image_tag(t)).collect()
  }

  #[test]
  fn minor_update_candidate() {
    let current = parse_image_tag("1.20.0");
    let available = tags(&[
      "1.20.0", "1.20.1", "1.21.0", "1.21.1", "2.0.0-beta",
    ]);
    let picked =
      select_candidate(&current, &available, &Policy::default())
        .unwrap();
    assert_eq!(picked.tag, "1.21.1");
    assert_eq!(
      get_change_type(&current.version, &picked.version),
      ChangeType::Minor
    );
  }

  #[test]
  fn skips_prerelease_on_stable_current() {
    let current = parse_image_tag("1.20.0");
    let available =
      tags(&["1.20.0", "1.21.0-beta", "1.21.0-rc1"]);
    let picked =
      select_candidate(&current, &available, &Policy::default());
    assert!(picked.is_none());
  }

  #[test]
  fn suffix_isolation_candidate() {
    let current = parse_image_tag("1.20.0-alpine");
    let available =
      tags(&["1.21.0", "1.21.0-alpine", "1.22.0-slim"]);
    let picked =
      select_candidate(&current, &available, &Policy::default())
        .unwrap();
    assert_eq!(picked.tag, "1.21.0-alpine");
  }

  #[test]
  fn pin_minor_bounds_candidate() {
    let current = parse_image_tag("1.20.3");
    let available = tags(&["1.20.4", "1.21.0", "2.0.0"]);
    let policy =
      Policy { version_pin_minor: true, ..Policy::default() };
    let picked =
      select_candidate(&current, &available, &policy).unwrap();
    assert_eq!(picked.tag, "1.20.4");
  }

  #[test]
  fn no_change_is_reflexive() {
    let v = Version::Semantic(super::super::Semantic {
      major: 1,
      minor: 0,
      patch: 0,
      prerelease: None,
      build: None,
    });
    assert_eq!(get_change_type(&v, &v), ChangeType::NoChange);
  }
}
