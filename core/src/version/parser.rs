use std::sync::LazyLock;

use regex::Regex;

use super::{DateVersion, Semantic, TagInfo, Version};

static SEMANTIC_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^v?(?P<major>\d+)(?:\.(?P<minor>\d+))?(?:\.(?P<patch>\d+))?(?:-(?P<pre>[0-9A-Za-z.-]+))?(?:\+(?P<build>[0-9A-Za-z.-]+))?$",
  )
  .unwrap()
});

static DATE_DASH_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})$").unwrap()
});

static DATE_COMPACT_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(?P<y>\d{4})(?P<m>\d{2})(?P<d>\d{2})$").unwrap()
});

static SHA_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[0-9a-f]{7,64}$").unwrap());

static NUMERIC_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\d+(\.\d+)+$").unwrap());

/// Splits a tag into `(version_part, suffix)`, peeling a trailing flavor
/// segment like `-slim`, `-alpine`, `-cuda` off the end before the residue
/// is classified. The semantic regex happily swallows a trailing `-alpine`
/// as a prerelease identifier (it's valid semver syntax), so flavor
/// suffixes have to be split off *first* - a purely-alphabetic tail after
/// the last `-` is a flavor, a tail with any digit (`rc1`, `beta.1`) is a
/// real prerelease and stays put.
fn split_suffix(tag: &str) -> (&str, Option<String>) {
  if let Some(idx) = tag.rfind('-') {
    let head = &tag[..idx];
    let tail = &tag[idx + 1..];
    if !head.is_empty()
      && !tail.is_empty()
      && tail.chars().all(|c| c.is_ascii_alphabetic())
      && parse_tag(head).is_some_and(|v| !matches!(v, Version::Opaque(_)))
    {
      return (head, Some(format!("-{tail}")));
    }
  }
  (tag, None)
}

/// Parses a bare tag string into a typed [`Version`]. Never returns
/// `None` - unrecognized forms fall back to `Opaque`.
pub fn parse_tag(s: &str) -> Option<Version> {
  if s.is_empty() {
    return None;
  }

  if let Some(rest) = s.strip_prefix("sha256:") {
    if rest.len() >= 7 && rest.chars().all(|c| c.is_ascii_hexdigit())
    {
      return Some(Version::Sha(format!("sha256:{rest}")));
    }
  }

  if let Some(caps) = DATE_DASH_RE.captures(s) {
    return build_date(&caps);
  }
  if let Some(caps) = DATE_COMPACT_RE.captures(s) {
    return build_date(&caps);
  }

  if NUMERIC_RE.is_match(s) && !SEMANTIC_RE.is_match(s) {
    let parts = s
      .split('.')
      .map(|p| p.parse::<u64>().unwrap_or(0))
      .collect();
    return Some(Version::Numeric(parts));
  }

  if let Some(caps) = SEMANTIC_RE.captures(s) {
    // Bare integers (`5`, `2024`) are ambiguous with date/numeric; only
    // treat as semantic when a minor or patch segment is present, or when
    // a prerelease/build tag disambiguates intent.
    let has_minor = caps.name("minor").is_some();
    let has_pre = caps.name("pre").is_some();
    let has_build = caps.name("build").is_some();
    if has_minor || has_pre || has_build {
      return Some(Version::Semantic(Semantic {
        major: caps["major"].parse().ok()?,
        minor: caps
          .name("minor")
          .map(|m| m.as_str().parse().unwrap_or(0))
          .unwrap_or(0),
        patch: caps
          .name("patch")
          .map(|m| m.as_str().parse().unwrap_or(0))
          .unwrap_or(0),
        prerelease: caps
          .name("pre")
          .map(|m| m.as_str().to_string()),
        build: caps.name("build").map(|m| m.as_str().to_string()),
      }));
    }
  }

  if SHA_RE.is_match(s) {
    return Some(Version::Sha(s.to_string()));
  }

  Some(Version::Opaque(s.to_string()))
}

fn build_date(caps: &regex::Captures) -> Option<Version> {
  let year = caps["y"].parse().ok()?;
  let month = caps["m"].parse().ok()?;
  let day = caps["d"].parse().ok()?;
  if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
    return None;
  }
  Some(Version::Date(DateVersion { year, month, day }))
}

/// Parses a full image tag string (the part after the rightmost `:` not
/// inside a digest) into a [`TagInfo`], splitting off a flavor suffix.
pub fn parse_image_tag(tag: &str) -> TagInfo {
  if tag.is_empty() || tag == "latest" {
    return TagInfo {
      tag: tag.to_string(),
      version: Version::Opaque(tag.to_string()),
      is_versioned: false,
      suffix: None,
    };
  }

  let (version_part, suffix) = split_suffix(tag);
  let version =
    parse_tag(version_part).unwrap_or(Version::Opaque(tag.to_string()));
  let is_versioned = !matches!(version, Version::Opaque(_));

  TagInfo { tag: tag.to_string(), version, is_versioned, suffix }
}

/// Splits an image reference's tag from its repository, honoring the rule
/// that digests (`@sha256:...`) take priority and a `:` inside a digest
/// must not be mistaken for the tag separator.
pub fn split_tag_from_reference(reference: &str) -> (&str, Option<&str>) {
  if let Some(idx) = reference.rfind('@') {
    return (&reference[..idx], None);
  }
  // The rightmost ':' is the tag separator only if nothing after it
  // contains a '/' (which would mean it was a port in the registry host).
  match reference.rfind(':') {
    Some(idx) if !reference[idx + 1..].contains('/') => {
      (&reference[..idx], Some(&reference[idx + 1..]))
    }
    _ => (reference, None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_semantic_with_v_prefix() {
    let v = parse_tag("v1.20.1").unwrap();
    assert_eq!(
      v,
      Version::Semantic(Semantic {
        major: 1,
        minor: 20,
        patch: 1,
        prerelease: None,
        build: None,
      })
    );
  }

  #[test]
  fn parses_prerelease_and_build() {
    let v = parse_tag("2.0.0-beta.1+build5").unwrap();
    match v {
      Version::Semantic(s) => {
        assert_eq!(s.prerelease.as_deref(), Some("beta.1"));
        assert_eq!(s.build.as_deref(), Some("build5"));
      }
      _ => panic!("expected semantic"),
    }
  }

  #[test]
  fn parses_date_both_forms() {
    assert_eq!(
      parse_tag("2024-01-05"),
      Some(Version::Date(DateVersion { year: 2024, month: 1, day: 5 }))
    );
    assert_eq!(
      parse_tag("20240105"),
      Some(Version::Date(DateVersion { year: 2024, month: 1, day: 5 }))
    );
  }

  #[test]
  fn parses_numeric_dotted_non_semantic() {
    assert_eq!(
      parse_tag("2024.11.5.2"),
      Some(Version::Numeric(vec![2024, 11, 5, 2]))
    );
  }

  #[test]
  fn parses_sha_forms() {
    assert_eq!(
      parse_tag("abc1234"),
      Some(Version::Sha("abc1234".to_string()))
    );
    assert_eq!(
      parse_tag("sha256:deadbeef"),
      Some(Version::Sha("sha256:deadbeef".to_string()))
    );
  }

  #[test]
  fn falls_back_to_opaque() {
    assert_eq!(
      parse_tag("latest"),
      Some(Version::Opaque("latest".to_string()))
    );
  }

  #[test]
  fn suffix_isolation() {
    let info = parse_image_tag("1.21.0-alpine");
    assert_eq!(info.suffix.as_deref(), Some("-alpine"));
    match info.version {
      Version::Semantic(s) => assert_eq!(s.patch, 0),
      _ => panic!("expected semantic"),
    }
  }

  #[test]
  fn split_tag_ignores_port_colon() {
    let (repo, tag) =
      split_tag_from_reference("registry.local:5000/app:1.0.0");
    assert_eq!(repo, "registry.local:5000/app");
    assert_eq!(tag, Some("1.0.0"));
  }

  #[test]
  fn split_tag_prefers_digest() {
    let (repo, tag) = split_tag_from_reference(
      "app@sha256:deadbeefdeadbeefdeadbeefdeadbeef",
    );
    assert_eq!(repo, "app");
    assert_eq!(tag, None);
  }
}
