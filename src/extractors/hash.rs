use super::{
  acceptance::accept_hash,
  pattern::{CandidatePattern, PatternStore},
  ranked::{ExtractContext, ExtractMatch, RankedExtractor},
};
use crate::{
  common::errors::ConfigError,
  configs::{LengthBounds, PatternConfig},
};

const JQUERY_IFRAME_ATOB: &str =
  r#"\$\(\s*['"]<iframe>['"]\s*\)\.attr\(\s*['"]src['"]\s*,\s*atob\(\s*['"](?P<value>[^'"]+)['"]\s*\)"#;
const IFRAME_BASE64_SRC: &str =
  r#"<iframe[^>]+src\s*=\s*["']data:text/html;base64,(?P<value>[^"']+)["']"#;
const VAR_ASSIGNMENT: &str =
  r#"(?:var|let|const)\s+\w+\s*=\s*["'](?P<value>[A-Za-z0-9+/=]{50,})["']"#;

/// The `data-hash` attribute must be followed by the provider's label, with
/// only tags and whitespace in between, so a page listing several servers
/// yields the hash of the right one.
fn data_hash_pattern(display_name: &str) -> String {
  format!(
    r#"(?i)data-hash\s*=\s*["'](?P<value>[^"']+)["'][^>]*>(?:\s*<[^>]+>)*\s*{}"#,
    regex::escape(display_name)
  )
}

pub fn builtin_patterns(display_name: &str) -> Result<Vec<CandidatePattern>, ConfigError> {
  Ok(vec![
    CandidatePattern::regex("data-hash-attribute", &data_hash_pattern(display_name))?,
    CandidatePattern::regex("jquery-iframe-atob", JQUERY_IFRAME_ATOB)?,
    CandidatePattern::regex("iframe-base64-src", IFRAME_BASE64_SRC)?,
    CandidatePattern::regex("var-assignment", VAR_ASSIGNMENT)?,
  ])
}

/// Locates the relay hash on an entry page.
pub struct HashExtractor {
  inner: RankedExtractor,
  bounds: LengthBounds,
}

impl HashExtractor {
  pub fn new(
    provider: &str,
    display_name: &str,
    extra: &[PatternConfig],
    bounds: LengthBounds,
    store: PatternStore,
  ) -> Result<Self, ConfigError> {
    let mut patterns = builtin_patterns(display_name)?;
    for config in extra {
      patterns.push(CandidatePattern::from_config(config)?);
    }

    Ok(Self {
      inner: RankedExtractor::new("hash", format!("{}.hash", provider), patterns, store),
      bounds,
    })
  }

  pub fn extract(&self, html: &str, ctx: &ExtractContext<'_>) -> Option<ExtractMatch> {
    self.inner
      .extract(html, ctx, |capture| accept_hash(&capture.value, self.bounds))
  }

  pub fn ranked(&self) -> &RankedExtractor {
    &self.inner
  }
}
