use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LoggingConfig {
  pub level: Option<String>,
  pub filters: Option<String>,
  /// Keep per-stage DEBUG events in the in-memory store.
  #[serde(default)]
  pub steps: bool,
  /// Maximum number of correlated entries held in memory.
  pub retain: Option<usize>,
  #[serde(default)]
  pub ansi: Option<bool>,
}

impl LoggingConfig {
  pub fn retain(&self) -> usize {
    self.retain.unwrap_or(2_000)
  }
}
