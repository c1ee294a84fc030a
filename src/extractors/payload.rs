use serde::Serialize;

use super::{
  acceptance::accept_payload,
  pattern::{CandidatePattern, PatternStore},
  ranked::{ExtractContext, RankedExtractor},
};
use crate::{
  common::errors::ConfigError,
  configs::{PatternConfig, PayloadBounds},
};

const DISPLAY_NONE_ID_FIRST: &str = r#"(?is)<div[^>]*\bid\s*=\s*["'](?P<id>[^"']+)["'][^>]*\bstyle\s*=\s*["'][^"']*display\s*:\s*none[^"']*["'][^>]*>(?P<value>[^<]+)</div>"#;
const DISPLAY_NONE_STYLE_FIRST: &str = r#"(?is)<div[^>]*\bstyle\s*=\s*["'][^"']*display\s*:\s*none[^"']*["'][^>]*\bid\s*=\s*["'](?P<id>[^"']+)["'][^>]*>(?P<value>[^<]+)</div>"#;
const VISIBILITY_HIDDEN: &str = r#"(?is)<(?:div|span|p)[^>]*\bid\s*=\s*["'](?P<id>[^"']+)["'][^>]*visibility\s*:\s*hidden[^>]*>(?P<value>[^<]+)</(?:div|span|p)>"#;
const HIDDEN_CLASS: &str = r#"(?is)<div[^>]*\bid\s*=\s*["'](?P<id>[^"']+)["'][^>]*\bclass\s*=\s*["'][^"']*\bhidden\b[^"']*["'][^>]*>(?P<value>[^<]+)</div>"#;
const DATA_ENCODED: &str =
  r#"(?is)<[a-z]+[^>]*\bid\s*=\s*["'](?P<id>[^"']+)["'][^>]*\bdata-encoded\s*=\s*["'](?P<value>[^"']+)["']"#;
const ENCODED_ID_FALLBACK: &str =
  r#"(?is)<div[^>]*\bid\s*=\s*["'](?P<id>enc_[^"']*)["'][^>]*>(?P<value>[^<]+)</div>"#;

pub fn builtin_patterns() -> Result<Vec<CandidatePattern>, ConfigError> {
  Ok(vec![
    CandidatePattern::selector(
      "hidden-element-dom",
      r#"div[id][style*="display:none"], div[id][style*="display: none"]"#,
      None,
    )?,
    CandidatePattern::regex("display-none-id-first", DISPLAY_NONE_ID_FIRST)?,
    CandidatePattern::regex("display-none-style-first", DISPLAY_NONE_STYLE_FIRST)?,
    CandidatePattern::regex("visibility-hidden", VISIBILITY_HIDDEN)?,
    CandidatePattern::regex("hidden-class", HIDDEN_CLASS)?,
    CandidatePattern::regex("data-encoded-attribute", DATA_ENCODED)?,
    CandidatePattern::regex("encoded-id-fallback", ENCODED_ID_FALLBACK)?,
  ])
}

/// Encoded text found in an invisible element, with the element's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HiddenPayload {
  pub container_id: Option<String>,
  pub encoded: String,
  #[serde(skip)]
  pub pattern: String,
}

pub struct PayloadExtractor {
  inner: RankedExtractor,
  bounds: PayloadBounds,
}

impl PayloadExtractor {
  pub fn new(
    provider: &str,
    extra: &[PatternConfig],
    bounds: PayloadBounds,
    store: PatternStore,
  ) -> Result<Self, ConfigError> {
    let mut patterns = builtin_patterns()?;
    for config in extra {
      patterns.push(CandidatePattern::from_config(config)?);
    }

    Ok(Self {
      inner: RankedExtractor::new(
        "payload",
        format!("{}.payload", provider),
        patterns,
        store,
      ),
      bounds,
    })
  }

  pub fn extract(&self, html: &str, ctx: &ExtractContext<'_>) -> Option<HiddenPayload> {
    let found = self.inner.extract(html, ctx, |capture| {
      accept_payload(capture.container.as_deref(), &capture.value, self.bounds)
    })?;

    Some(HiddenPayload {
      container_id: found.container,
      encoded: found.value.trim().to_string(),
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

  const ENCODED: &str = "aHR0cHM6Ly9leGFtcGxlLnRlc3QvbWFzdGVyLm0zdTg=";
  const CTX: ExtractContext<'static> = ExtractContext {
    request_id: "1700000000000-abcd1234",
    provider: "alpha",
  };

  fn extractor() -> PayloadExtractor {
    PayloadExtractor::new(
      "alpha",
      &[],
      PayloadBounds {
        min_len: 20,
        max_len: 16_384,
        min_container_len: 3,
      },
      PatternStore::new(),
    )
    .unwrap()
  }

  #[test]
  fn test_display_none_div() {
    let html = format!(
      r#"<html><body><div id="xTyBxQyGTA" style="display:none;">{ENCODED}</div></body></html>"#
    );
    let payload = extractor().extract(&html, &CTX).unwrap();
    assert_eq!(payload.container_id.as_deref(), Some("xTyBxQyGTA"));
    assert_eq!(payload.encoded, ENCODED);
    assert_eq!(payload.pattern, "hidden-element-dom");
  }

  #[test]
  fn test_decoy_with_markup_is_skipped() {
    let html = format!(
      r#"<div id="decoy01" style="display:none"><span>{ENCODED}</span></div>
         <div id="real0001" style="display:none">{ENCODED}</div>"#
    );
    let payload = extractor().extract(&html, &CTX).unwrap();
    assert_eq!(payload.container_id.as_deref(), Some("real0001"));
  }

  #[test]
  fn test_visibility_hidden_span() {
    let html = format!(r#"<span id="pl_data" style="visibility: hidden">{ENCODED}</span>"#);
    let payload = extractor().extract(&html, &CTX).unwrap();
    assert_eq!(payload.pattern, "visibility-hidden");
    assert_eq!(payload.container_id.as_deref(), Some("pl_data"));
  }

  #[test]
  fn test_hidden_class_and_fallback() {
    let html = format!(r#"<div id="stash" class="box hidden">{ENCODED}</div>"#);
    assert_eq!(extractor().extract(&html, &CTX).unwrap().pattern, "hidden-class");

    let html = format!(r#"<div id="enc_77">{ENCODED}</div>"#);
    assert_eq!(
      extractor().extract(&html, &CTX).unwrap().pattern,
      "encoded-id-fallback"
    );
  }

  #[test]
  fn test_visible_text_is_not_a_payload() {
    let html = r#"<div id="title">Just a visible heading with words</div>"#;
    assert!(extractor().extract(html, &CTX).is_none());
  }
}
