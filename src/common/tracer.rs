use std::time::Duration;

use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};

use super::types::unix_millis;

const RANDOM_LEN: usize = 8;
const TIMESTAMP_LEN: usize = 13;

/// Correlation token tying together every log entry and audit record of one call.
///
/// Format: `<unix millis, 13 digits>-<8 lowercase alphanumerics>`,
/// e.g. `1718000000000-a1b2c3d4`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
  pub fn generate() -> Self {
    let rng = rand::thread_rng();
    let suffix: String = rng
      .sample_iter(&Alphanumeric)
      .map(|b| (b as char).to_ascii_lowercase())
      .take(RANDOM_LEN)
      .collect();
    Self(format!("{:013}-{}", unix_millis(), suffix))
  }

  /// Accepts an externally supplied id, rejecting anything not produced by [`generate`](Self::generate).
  pub fn parse(raw: &str) -> Option<Self> {
    Self::is_valid(raw).then(|| Self(raw.to_string()))
  }

  pub fn is_valid(raw: &str) -> bool {
    let Some((ts, suffix)) = raw.split_once('-') else {
      return false;
    };
    ts.len() == TIMESTAMP_LEN
      && ts.bytes().all(|b| b.is_ascii_digit())
      && suffix.len() == RANDOM_LEN
      && suffix
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
  }

  pub fn timestamp_ms(&self) -> u64 {
    self.0
      .split('-')
      .next()
      .and_then(|ts| ts.parse().ok())
      .unwrap_or_default()
  }

  /// Time elapsed since the id was minted.
  pub fn age(&self) -> Duration {
    Duration::from_millis(unix_millis().saturating_sub(self.timestamp_ms()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for CorrelationId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_generated_id_is_valid() {
    let id = CorrelationId::generate();
    assert!(CorrelationId::is_valid(id.as_str()), "bad id: {}", id);
    assert!(id.age() < Duration::from_secs(5));
  }

  #[test]
  fn test_generated_ids_differ() {
    let a = CorrelationId::generate();
    let b = CorrelationId::generate();
    assert_ne!(a, b);
  }

  #[test]
  fn test_parse_rejects_malformed() {
    assert!(CorrelationId::parse("1234567890123-a1b2c3d4").is_some());
    assert!(CorrelationId::parse("123-a1b2c3d4").is_none());
    assert!(CorrelationId::parse("1234567890123-A1B2C3D4").is_none());
    assert!(CorrelationId::parse("1234567890123a1b2c3d4").is_none());
    assert!(CorrelationId::parse("").is_none());
  }

  #[test]
  fn test_timestamp_roundtrip() {
    let id = CorrelationId::parse("1700000000000-zzzz9999").unwrap();
    assert_eq!(id.timestamp_ms(), 1_700_000_000_000);
  }
}
