use std::{
  collections::HashMap,
  sync::LazyLock,
};

use regex::{Captures, Regex};
use serde::Serialize;

pub(crate) static PLACEHOLDER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("placeholder regex"));

/// Concrete URLs for one decoded stream, canonical first. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedUrlSet {
  primary: String,
  alternates: Vec<String>,
}

impl ResolvedUrlSet {
  /// `None` when `urls` is empty; duplicates are dropped, order kept.
  pub fn from_urls(urls: impl IntoIterator<Item = String>) -> Option<Self> {
    let mut iter = urls.into_iter();
    let primary = iter.next()?;
    let mut alternates: Vec<String> = Vec::new();
    for url in iter {
      if url != primary && !alternates.contains(&url) {
        alternates.push(url);
      }
    }
    Some(Self {
      primary,
      alternates,
    })
  }

  pub fn primary(&self) -> &str {
    &self.primary
  }

  pub fn alternates(&self) -> &[String] {
    &self.alternates
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    std::iter::once(self.primary.as_str()).chain(self.alternates.iter().map(String::as_str))
  }

  pub fn len(&self) -> usize {
    1 + self.alternates.len()
  }

  pub fn is_empty(&self) -> bool {
    false
  }
}

/// Maps `{token}` placeholders to concrete CDN hosts.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderResolver {
  table: HashMap<String, String>,
}

impl PlaceholderResolver {
  pub fn new(table: HashMap<String, String>) -> Self {
    Self { table }
  }

  /// Substitutes every token in one pass. Unknown tokens become their inner
  /// text, so `{cdn9}` turns into `cdn9`.
  pub fn resolve(&self, url: &str) -> Vec<String> {
    let resolved = PLACEHOLDER.replace_all(url, |caps: &Captures<'_>| {
      let token = &caps[1];
      match self.table.get(token) {
        Some(domain) => domain.clone(),
        None => token.to_string(),
      }
    });
    vec![resolved.into_owned()]
  }

  /// Resolves each `" or "`-separated variant of a decoded payload.
  pub fn resolve_all(&self, plaintext: &str) -> Option<ResolvedUrlSet> {
    let urls = plaintext
      .split(" or ")
      .map(str::trim)
      .filter(|part| !part.is_empty())
      .flat_map(|part| self.resolve(part));
    ResolvedUrlSet::from_urls(urls)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn resolver() -> PlaceholderResolver {
    PlaceholderResolver::new(HashMap::from([
      ("tagA".to_string(), "example.test".to_string()),
      ("v2".to_string(), "cdn-two.example.test".to_string()),
    ]))
  }

  #[test]
  fn test_known_token() {
    assert_eq!(
      resolver().resolve("https://{tagA}/path/master.m3u8"),
      vec!["https://example.test/path/master.m3u8"]
    );
  }

  #[test]
  fn test_unknown_token_echoes_inner_text() {
    assert_eq!(
      resolver().resolve("https://{unknownTag}/master.m3u8"),
      vec!["https://unknownTag/master.m3u8"]
    );
  }

  #[test]
  fn test_repeated_token_resolves_identically() {
    let out = resolver().resolve("https://{v2}/a/{v2}/master.m3u8");
    assert_eq!(out, vec!["https://cdn-two.example.test/a/cdn-two.example.test/master.m3u8"]);
  }

  #[test]
  fn test_no_placeholders_is_unchanged() {
    let url = "https://example.test/master.m3u8";
    assert_eq!(resolver().resolve(url), vec![url]);
  }

  #[test]
  fn test_resolve_all_splits_variants() {
    let set = resolver()
      .resolve_all("https://{tagA}/m.m3u8 or https://{v2}/m.m3u8 or https://{tagA}/m.m3u8")
      .unwrap();
    assert_eq!(set.primary(), "https://example.test/m.m3u8");
    assert_eq!(set.alternates(), &["https://cdn-two.example.test/m.m3u8".to_string()]);
    assert_eq!(set.len(), 2);
    assert!(resolver().resolve_all("   ").is_none());
  }
}
