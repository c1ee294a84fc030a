use std::time::Instant;

use tracing::{debug, info, warn};

use super::{
  acceptance::Rejection,
  pattern::{CandidatePattern, Capture, Document, PatternAttempt, PatternStats, PatternStore},
};
use crate::protocol::audit::millis;

/// Who is asking, for log correlation.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext<'a> {
  pub request_id: &'a str,
  pub provider: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractMatch {
  pub value: String,
  pub container: Option<String>,
  pub pattern: String,
  pub prefix: Option<String>,
  /// How many patterns were applied before this one was accepted, inclusive.
  pub tried: usize,
}

/// Applies its patterns in success-rate order and returns the first
/// capture the acceptance predicate lets through.
pub struct RankedExtractor {
  component: &'static str,
  scope: String,
  patterns: Vec<CandidatePattern>,
  store: PatternStore,
}

impl RankedExtractor {
  pub fn new(
    component: &'static str,
    scope: impl Into<String>,
    patterns: Vec<CandidatePattern>,
    store: PatternStore,
  ) -> Self {
    Self {
      component,
      scope: scope.into(),
      patterns,
      store,
    }
  }

  pub fn scope(&self) -> &str {
    &self.scope
  }

  pub fn ranked_names(&self) -> Vec<&str> {
    self.store
      .rank(&self.scope, &self.patterns)
      .into_iter()
      .map(|i| self.patterns[i].name.as_str())
      .collect()
  }

  pub fn stats(&self) -> Vec<(String, PatternStats)> {
    self.patterns
      .iter()
      .map(|p| (p.name.clone(), self.store.get(&self.scope, &p.name)))
      .collect()
  }

  pub fn extract<F>(&self, text: &str, ctx: &ExtractContext<'_>, accept: F) -> Option<ExtractMatch>
  where
    F: Fn(&Capture) -> Result<(), Rejection>,
  {
    let started = Instant::now();
    let doc = Document::new(text);
    let order = self.store.rank(&self.scope, &self.patterns);

    for (tried, index) in order.iter().enumerate() {
      let pattern = &self.patterns[*index];
      self.store.record_attempt(&self.scope, &pattern.name);

      let captures = match pattern.apply(&doc) {
        PatternAttempt::Matched(captures) => captures,
        PatternAttempt::NotMatched => {
          debug!(
            request_id = ctx.request_id,
            provider = ctx.provider,
            component = self.component,
            stage = self.component,
            pattern = pattern.name.as_str(),
            "pattern did not match"
          );
          continue;
        }
      };

      let total = captures.len() as u64;
      let mut rejections = Vec::new();
      for capture in captures {
        match accept(&capture) {
          Ok(()) => {
            self.store.record_success(&self.scope, &pattern.name);
            info!(
              request_id = ctx.request_id,
              provider = ctx.provider,
              component = self.component,
              pattern = pattern.name.as_str(),
              tried = (tried + 1) as u64,
              value_len = capture.value.len() as u64,
              duration_ms = millis(started.elapsed()),
              "extracted"
            );
            return Some(ExtractMatch {
              value: capture.value,
              container: capture.container,
              pattern: pattern.name.clone(),
              prefix: pattern.prefix.clone(),
              tried: tried + 1,
            });
          }
          Err(rejection) => rejections.push(rejection.to_string()),
        }
      }

      debug!(
        request_id = ctx.request_id,
        provider = ctx.provider,
        component = self.component,
        stage = self.component,
        pattern = pattern.name.as_str(),
        matches = total,
        rejected = ?rejections,
        "every capture rejected"
      );
    }

    warn!(
      request_id = ctx.request_id,
      provider = ctx.provider,
      component = self.component,
      patterns = self.patterns.len() as u64,
      input_len = text.len() as u64,
      duration_ms = millis(started.elapsed()),
      "no pattern produced an accepted value"
    );
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const CTX: ExtractContext<'static> = ExtractContext {
    request_id: "1700000000000-abcd1234",
    provider: "alpha",
  };

  fn at_least(min: usize) -> impl Fn(&Capture) -> Result<(), Rejection> {
    move |c: &Capture| {
      if c.value.len() < min {
        Err(Rejection::TooShort {
          len: c.value.len(),
          min,
        })
      } else {
        Ok(())
      }
    }
  }

  fn extractor(store: PatternStore) -> RankedExtractor {
    RankedExtractor::new(
      "hash",
      "alpha.hash",
      vec![
        CandidatePattern::regex("short", r"short=(\w+)").unwrap(),
        CandidatePattern::regex("long", r"long=(\w+)").unwrap(),
      ],
      store,
    )
  }

  #[test]
  fn test_rejected_capture_falls_through_to_next_pattern() {
    let store = PatternStore::new();
    let ex = extractor(store.clone());
    let found = ex
      .extract("short=abc long=abcdefghij", &CTX, at_least(5))
      .unwrap();
    assert_eq!(found.value, "abcdefghij");
    assert_eq!(found.pattern, "long");
    assert_eq!(found.tried, 2);
    assert_eq!(store.get("alpha.hash", "short").attempts, 1);
    assert_eq!(store.get("alpha.hash", "short").successes, 0);
    assert_eq!(store.get("alpha.hash", "long").successes, 1);
  }

  #[test]
  fn test_later_decoy_is_skipped_for_accepted_block() {
    let ex = extractor(PatternStore::new());
    let found = ex
      .extract("long=ab long=abcdefgh", &CTX, at_least(5))
      .unwrap();
    assert_eq!(found.value, "abcdefgh");
  }

  #[test]
  fn test_not_found_is_none() {
    let ex = extractor(PatternStore::new());
    assert!(ex.extract("nothing here", &CTX, at_least(1)).is_none());
  }

  #[test]
  fn test_success_reorders_next_call() {
    let ex = extractor(PatternStore::new());
    assert_eq!(ex.ranked_names(), vec!["short", "long"]);
    ex.extract("long=abcdefgh", &CTX, at_least(5));
    assert_eq!(ex.ranked_names(), vec!["long", "short"]);

    let found = ex.extract("long=abcdefgh", &CTX, at_least(5)).unwrap();
    assert_eq!(found.tried, 1);
  }
}
