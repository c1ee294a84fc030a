use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Length bounds applied to a captured candidate before it is accepted.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct LengthBounds {
  pub min_len: usize,
  pub max_len: usize,
}

impl LengthBounds {
  pub const fn new(min_len: usize, max_len: usize) -> Self {
    Self { min_len, max_len }
  }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct PayloadBounds {
  pub min_len: usize,
  pub max_len: usize,
  pub min_container_len: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExtractionConfig {
  #[serde(default = "default_hash_bounds")]
  pub hash: LengthBounds,
  #[serde(default = "default_relay_bounds")]
  pub relay: LengthBounds,
  #[serde(default = "default_payload_bounds")]
  pub payload: PayloadBounds,
  /// Reorder the decode cascade by observed success rate.
  #[serde(default)]
  pub adaptive_decoders: bool,
  #[serde(default = "default_required_suffix")]
  pub required_suffix: String,
  #[serde(default)]
  pub check_availability: bool,
  /// Upper bound for a whole extraction call, across every stage.
  pub call_timeout_ms: Option<u64>,
}

fn default_hash_bounds() -> LengthBounds {
  LengthBounds::new(20, 4_096)
}

fn default_relay_bounds() -> LengthBounds {
  LengthBounds::new(10, 500)
}

fn default_payload_bounds() -> PayloadBounds {
  PayloadBounds {
    min_len: 20,
    max_len: 16_384,
    min_container_len: 3,
  }
}

fn default_required_suffix() -> String {
  ".m3u8".to_string()
}

impl Default for ExtractionConfig {
  fn default() -> Self {
    Self {
      hash: default_hash_bounds(),
      relay: default_relay_bounds(),
      payload: default_payload_bounds(),
      adaptive_decoders: false,
      required_suffix: default_required_suffix(),
      check_availability: false,
      call_timeout_ms: None,
    }
  }
}

impl ExtractionConfig {
  pub fn call_timeout(&self) -> Option<Duration> {
    self.call_timeout_ms.map(Duration::from_millis)
  }
}
