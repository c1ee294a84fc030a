use super::{
  acceptance::accept_relay_path,
  pattern::{CandidatePattern, PatternStore},
  ranked::{ExtractContext, RankedExtractor},
};
use crate::{
  common::errors::ConfigError,
  configs::{LengthBounds, PatternConfig},
};

const SCRIPT_SRC_PROPERTY: &str =
  r#"\bsrc\s*:\s*['"](?P<value>(?:https?://[^'"/\s]+)?/(?:prorcp|srcrcp)/[^'"]+)['"]"#;

fn jquery(prefix: &str) -> String {
  format!(
    r#"\$\(\s*['"]<iframe>['"]\s*\)\.attr\(\s*['"]src['"]\s*,\s*['"]/{}/(?P<value>[^'"]+)['"]\s*\)"#,
    prefix
  )
}

fn iframe(prefix: &str) -> String {
  format!(r#"<iframe[^>]+src\s*=\s*["']/{}/(?P<value>[^"']+)["']"#, prefix)
}

fn var(prefix: &str) -> String {
  format!(
    r#"(?:var|let|const)\s+\w+\s*=\s*["']/{}/(?P<value>[^"']+)["']"#,
    prefix
  )
}

fn obj(prefix: &str) -> String {
  format!(r#"\w+\s*:\s*["']/{}/(?P<value>[^"']+)["']"#, prefix)
}

pub fn builtin_patterns() -> Result<Vec<CandidatePattern>, ConfigError> {
  let mut patterns = vec![
    CandidatePattern::selector(
      "iframe-relay-src",
      r#"iframe[src*="/prorcp/"], iframe[src*="/srcrcp/"]"#,
      Some("src"),
    )?,
    CandidatePattern::regex("script-src-property", SCRIPT_SRC_PROPERTY)?,
  ];

  let shapes: [(&str, &str, fn(&str) -> String); 8] = [
    ("jquery", "prorcp", jquery),
    ("iframe", "prorcp", iframe),
    ("var", "prorcp", var),
    ("obj", "prorcp", obj),
    ("iframe", "srcrcp", iframe),
    ("jquery", "srcrcp", jquery),
    ("var", "srcrcp", var),
    ("obj", "srcrcp", obj),
  ];
  for (shape, prefix, build) in shapes {
    patterns.push(
      CandidatePattern::regex(format!("{}-{}", shape, prefix), &build(prefix))?
        .with_prefix(prefix),
    );
  }

  Ok(patterns)
}

/// Turns a captured relay reference into an absolute URL.
///
/// Absolute URLs are kept, protocol-relative ones get `https:`, rooted paths
/// are joined onto `base`, and bare paths go under `base/<prefix>/`.
pub fn build_relay_url(base: &str, prefix: Option<&str>, path: &str) -> String {
  if path.starts_with("http://") || path.starts_with("https://") {
    return path.to_string();
  }
  if let Some(rest) = path.strip_prefix("//") {
    return format!("https://{}", rest);
  }

  let base = base.trim_end_matches('/');
  if path.starts_with('/') {
    return format!("{}{}", base, path);
  }
  match prefix {
    Some(prefix) => format!("{}/{}/{}", base, prefix.trim_matches('/'), path),
    None => format!("{}/{}", base, path),
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTarget {
  pub url: String,
  pub pattern: String,
}

/// Finds the secondary relay URL embedded in a relay page.
pub struct RelayExtractor {
  inner: RankedExtractor,
  bounds: LengthBounds,
  base: String,
}

impl RelayExtractor {
  pub fn new(
    provider: &str,
    base: &str,
    extra: &[PatternConfig],
    bounds: LengthBounds,
    store: PatternStore,
  ) -> Result<Self, ConfigError> {
    let mut patterns = builtin_patterns()?;
    for config in extra {
      patterns.push(CandidatePattern::from_config(config)?);
    }

    Ok(Self {
      inner: RankedExtractor::new("relay", format!("{}.relay", provider), patterns, store),
      bounds,
      base: base.to_string(),
    })
  }

  pub fn extract(&self, html: &str, ctx: &ExtractContext<'_>) -> Option<RelayTarget> {
    let found = self
      .inner
      .extract(html, ctx, |capture| accept_relay_path(&capture.value, self.bounds))?;

    Some(RelayTarget {
      url: build_relay_url(&self.base, found.prefix.as_deref(), &found.value),
      pattern: found.pattern,
    })
  }

  pub fn ranked(&self) -> &RankedExtractor {
    &self.inner
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const BASE: &str = "https://relay.example.test";
  const CTX: ExtractContext<'static> = ExtractContext {
    request_id: "1700000000000-abcd1234",
    provider: "alpha",
  };

  fn extractor() -> RelayExtractor {
    RelayExtractor::new(
      "alpha",
      BASE,
      &[],
      LengthBounds::new(10, 500),
      PatternStore::new(),
    )
    .unwrap()
  }

  #[test]
  fn test_url_construction() {
    assert_eq!(
      build_relay_url(BASE, Some("prorcp"), "Zm9vYmFyYmF6"),
      "https://relay.example.test/prorcp/Zm9vYmFyYmF6"
    );
    assert_eq!(
      build_relay_url("https://relay.example.test/", None, "/srcrcp/Zm9v"),
      "https://relay.example.test/srcrcp/Zm9v"
    );
    assert_eq!(
      build_relay_url(BASE, None, "//cdn.example.test/prorcp/x"),
      "https://cdn.example.test/prorcp/x"
    );
    assert_eq!(
      build_relay_url(BASE, Some("prorcp"), "https://other.example.test/prorcp/x"),
      "https://other.example.test/prorcp/x"
    );
  }

  #[test]
  fn test_iframe_from_dom() {
    let html = r#"<html><body><iframe id="player_iframe" src="/prorcp/Zm9vYmFyYmF6cXV4" frameborder="0"></iframe></body></html>"#;
    let target = extractor().extract(html, &CTX).unwrap();
    assert_eq!(target.url, "https://relay.example.test/prorcp/Zm9vYmFyYmF6cXV4");
    assert_eq!(target.pattern, "iframe-relay-src");
  }

  #[test]
  fn test_jquery_srcrcp_uses_prefix() {
    let html = r#"<script>$('<iframe>').attr('src', '/srcrcp/Zm9vYmFyYmF6cXV4');</script>"#;
    let target = extractor().extract(html, &CTX).unwrap();
    assert_eq!(target.url, "https://relay.example.test/srcrcp/Zm9vYmFyYmF6cXV4");
    assert_eq!(target.pattern, "jquery-srcrcp");
  }

  #[test]
  fn test_script_property_keeps_full_path() {
    let html = r#"<script>player.load({ src: '/prorcp/Zm9vYmFyYmF6cXV4' });</script>"#;
    let target = extractor().extract(html, &CTX).unwrap();
    assert_eq!(target.url, "https://relay.example.test/prorcp/Zm9vYmFyYmF6cXV4");
    assert_eq!(target.pattern, "script-src-property");
  }

  #[test]
  fn test_short_path_not_accepted() {
    let html = r#"<script>var u = '/prorcp/abc';</script>"#;
    assert!(extractor().extract(html, &CTX).is_none());
  }
}
