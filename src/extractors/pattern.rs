use std::{cell::OnceCell, cmp::Ordering, collections::BTreeMap, sync::Arc};

use dashmap::DashMap;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;

use crate::{
  common::{errors::ConfigError, types::unix_millis},
  configs::PatternConfig,
};

/// Markup under inspection. The DOM is only built if a selector pattern asks for it.
pub struct Document<'a> {
  raw: &'a str,
  parsed: OnceCell<Html>,
}

impl<'a> Document<'a> {
  pub fn new(raw: &'a str) -> Self {
    Self {
      raw,
      parsed: OnceCell::new(),
    }
  }

  pub fn raw(&self) -> &'a str {
    self.raw
  }

  fn html(&self) -> &Html {
    self.parsed.get_or_init(|| Html::parse_document(self.raw))
  }
}

/// A syntactically captured value, not yet accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
  pub value: String,
  pub container: Option<String>,
}

/// Result of applying one pattern to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternAttempt {
  Matched(Vec<Capture>),
  NotMatched,
}

enum Matcher {
  Regex(Regex),
  Selector {
    selector: Selector,
    attr: Option<String>,
  },
}

/// A named recognition rule.
pub struct CandidatePattern {
  pub name: String,
  pub prefix: Option<String>,
  matcher: Matcher,
}

impl CandidatePattern {
  pub fn regex(name: impl Into<String>, pattern: &str) -> Result<Self, ConfigError> {
    let name = name.into();
    let regex = Regex::new(pattern).map_err(|source| ConfigError::Pattern {
      name: name.clone(),
      source,
    })?;

    let has_value_group = regex.capture_names().flatten().any(|n| n == "value");
    if !has_value_group && regex.captures_len() < 2 {
      return Err(ConfigError::PatternCapture { name });
    }

    Ok(Self {
      name,
      prefix: None,
      matcher: Matcher::Regex(regex),
    })
  }

  pub fn selector(
    name: impl Into<String>,
    css: &str,
    attr: Option<&str>,
  ) -> Result<Self, ConfigError> {
    let name = name.into();
    let selector = Selector::parse(css).map_err(|e| ConfigError::Selector {
      name: name.clone(),
      reason: e.to_string(),
    })?;

    Ok(Self {
      name,
      prefix: None,
      matcher: Matcher::Selector {
        selector,
        attr: attr.map(str::to_string),
      },
    })
  }

  pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.prefix = Some(prefix.into());
    self
  }

  pub fn from_config(config: &PatternConfig) -> Result<Self, ConfigError> {
    let pattern = match (&config.regex, &config.selector) {
      (Some(regex), None) => Self::regex(config.name.clone(), regex)?,
      (None, Some(css)) => Self::selector(config.name.clone(), css, config.attr.as_deref())?,
      _ => {
        return Err(ConfigError::PatternKind {
          name: config.name.clone(),
        });
      }
    };

    Ok(match &config.prefix {
      Some(prefix) => pattern.with_prefix(prefix.clone()),
      None => pattern,
    })
  }

  /// Collects every match, since relay pages often carry stale decoy blocks
  /// ahead of the live one.
  pub fn apply(&self, doc: &Document<'_>) -> PatternAttempt {
    let captures: Vec<Capture> = match &self.matcher {
      Matcher::Regex(regex) => regex
        .captures_iter(doc.raw())
        .filter_map(|caps| {
          let value = caps.name("value").or_else(|| caps.get(1))?;
          Some(Capture {
            value: value.as_str().trim().to_string(),
            container: caps.name("id").map(|m| m.as_str().to_string()),
          })
        })
        .collect(),
      Matcher::Selector { selector, attr } => doc
        .html()
        .select(selector)
        .filter_map(|el| {
          let value = match attr {
            Some(attr) => el.value().attr(attr)?.to_string(),
            None => el.inner_html(),
          };
          Some(Capture {
            value: value.trim().to_string(),
            container: el.value().id().map(str::to_string),
          })
        })
        .collect(),
    };

    if captures.is_empty() {
      PatternAttempt::NotMatched
    } else {
      PatternAttempt::Matched(captures)
    }
  }
}

impl std::fmt::Debug for CandidatePattern {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let kind = match &self.matcher {
      Matcher::Regex(r) => format!("regex({})", r.as_str()),
      Matcher::Selector { attr, .. } => format!("selector(attr={:?})", attr),
    };
    f.debug_struct("CandidatePattern")
      .field("name", &self.name)
      .field("prefix", &self.prefix)
      .field("matcher", &kind)
      .finish()
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternStats {
  pub attempts: u64,
  pub successes: u64,
  pub last_success_ms: Option<u64>,
}

impl PatternStats {
  /// `None` until the pattern has been tried at least once.
  pub fn success_rate(&self) -> Option<f64> {
    (self.attempts > 0).then(|| self.successes as f64 / self.attempts as f64)
  }
}

/// Attempt/success counters keyed by `<scope>/<pattern>`.
///
/// Each key is updated under its shard lock, so concurrent calls never lose
/// an increment. Clones share the same counters.
#[derive(Clone, Default)]
pub struct PatternStore {
  stats: Arc<DashMap<String, PatternStats>>,
}

impl PatternStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn key(scope: &str, pattern: &str) -> String {
    format!("{}/{}", scope, pattern)
  }

  pub fn record_attempt(&self, scope: &str, pattern: &str) {
    self.stats
      .entry(Self::key(scope, pattern))
      .or_default()
      .attempts += 1;
  }

  pub fn record_success(&self, scope: &str, pattern: &str) {
    let mut entry = self.stats.entry(Self::key(scope, pattern)).or_default();
    entry.successes += 1;
    entry.attempts = entry.attempts.max(entry.successes);
    entry.last_success_ms = Some(unix_millis());
  }

  pub fn get(&self, scope: &str, pattern: &str) -> PatternStats {
    self.stats
      .get(&Self::key(scope, pattern))
      .map(|s| *s)
      .unwrap_or_default()
  }

  pub fn snapshot(&self) -> BTreeMap<String, PatternStats> {
    self.stats
      .iter()
      .map(|e| (e.key().clone(), *e.value()))
      .collect()
  }

  pub fn reset(&self) {
    self.stats.clear();
  }

  /// Indices of `patterns` ordered by success rate, highest first. Untried
  /// patterns follow tried ones; ties keep declaration order.
  pub fn rank(&self, scope: &str, patterns: &[CandidatePattern]) -> Vec<usize> {
    let rates: Vec<Option<f64>> = patterns
      .iter()
      .map(|p| self.get(scope, &p.name).success_rate())
      .collect();
    rank_by_rate(&rates)
  }
}

/// Stable ordering shared by the extractors and the adaptive decode cascade.
pub fn rank_by_rate(rates: &[Option<f64>]) -> Vec<usize> {
  let mut order: Vec<usize> = (0..rates.len()).collect();
  order.sort_by(|&a, &b| match (rates[a], rates[b]) {
    (Some(ra), Some(rb)) => rb.total_cmp(&ra),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => Ordering::Equal,
  });
  order
}

#[cfg(test)]
mod tests {
  use super::*;

  fn patterns(names: &[&str]) -> Vec<CandidatePattern> {
    names
      .iter()
      .map(|n| CandidatePattern::regex(*n, r"x(?P<value>\d+)").unwrap())
      .collect()
  }

  #[test]
  fn test_successful_pattern_ranks_first() {
    let store = PatternStore::new();
    let pats = patterns(&["a", "b"]);
    assert_eq!(store.rank("hash", &pats), vec![0, 1]);

    store.record_attempt("hash", "b");
    store.record_success("hash", "b");
    store.record_attempt("hash", "a");
    assert_eq!(store.rank("hash", &pats), vec![1, 0]);
  }

  #[test]
  fn test_untried_sort_after_tried_and_ties_are_stable() {
    let rates = [None, Some(0.0), None, Some(0.5), Some(0.5)];
    assert_eq!(rank_by_rate(&rates), vec![3, 4, 1, 0, 2]);
  }

  #[test]
  fn test_scopes_do_not_collide() {
    let store = PatternStore::new();
    store.record_attempt("alpha.hash", "p");
    store.record_success("alpha.hash", "p");
    assert_eq!(store.get("alpha.hash", "p").successes, 1);
    assert_eq!(store.get("beta.hash", "p"), PatternStats::default());

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot["alpha.hash/p"].last_success_ms.is_some());
    store.reset();
    assert!(store.snapshot().is_empty());
  }

  #[test]
  fn test_counters_survive_concurrent_updates() {
    let store = PatternStore::new();
    let handles: Vec<_> = (0..8)
      .map(|_| {
        let store = store.clone();
        std::thread::spawn(move || {
          for _ in 0..250 {
            store.record_attempt("s", "p");
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }
    assert_eq!(store.get("s", "p").attempts, 2_000);
  }

  #[test]
  fn test_regex_without_capture_group_rejected() {
    let err = CandidatePattern::regex("bad", r"data-hash").unwrap_err();
    assert!(matches!(err, ConfigError::PatternCapture { .. }));
  }

  #[test]
  fn test_regex_collects_every_match() {
    let pattern = CandidatePattern::regex("n", r"x(?P<value>\d+)").unwrap();
    let doc = Document::new("x1 x22 y3");
    let PatternAttempt::Matched(caps) = pattern.apply(&doc) else {
      panic!("expected matches");
    };
    let values: Vec<&str> = caps.iter().map(|c| c.value.as_str()).collect();
    assert_eq!(values, vec!["1", "22"]);
  }

  #[test]
  fn test_selector_reads_attr_and_id() {
    let pattern =
      CandidatePattern::selector("frame", "iframe[src]", Some("src")).unwrap();
    let doc = Document::new(r#"<html><body><iframe id="player" src="/prorcp/abc"></iframe></body></html>"#);
    assert_eq!(
      pattern.apply(&doc),
      PatternAttempt::Matched(vec![Capture {
        value: "/prorcp/abc".into(),
        container: Some("player".into()),
      }])
    );
    let empty = Document::new("<p>nothing</p>");
    assert_eq!(pattern.apply(&empty), PatternAttempt::NotMatched);
  }

  #[test]
  fn test_config_must_pick_one_matcher() {
    let config = PatternConfig {
      name: "both".into(),
      regex: Some("(a)".into()),
      selector: Some("div".into()),
      ..Default::default()
    };
    assert!(matches!(
      CandidatePattern::from_config(&config),
      Err(ConfigError::PatternKind { .. })
    ));
  }
}
