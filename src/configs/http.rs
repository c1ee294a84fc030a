use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  #[serde(default = "default_retries")]
  pub retries: u32,
  #[serde(default = "default_backoff_base_ms")]
  pub backoff_base_ms: u64,
  #[serde(default = "default_backoff_max_ms")]
  pub backoff_max_ms: u64,
  #[serde(default = "default_probe_timeout_ms")]
  pub probe_timeout_ms: u64,
  #[serde(default = "default_user_agent")]
  pub user_agent: String,
  #[serde(default = "default_accept_language")]
  pub accept_language: String,
}

fn default_timeout_ms() -> u64 {
  10_000
}

fn default_retries() -> u32 {
  2
}

fn default_backoff_base_ms() -> u64 {
  1_000
}

fn default_backoff_max_ms() -> u64 {
  5_000
}

fn default_probe_timeout_ms() -> u64 {
  5_000
}

fn default_user_agent() -> String {
  DEFAULT_USER_AGENT.to_string()
}

fn default_accept_language() -> String {
  "en-US,en;q=0.9".to_string()
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_ms: default_timeout_ms(),
      retries: default_retries(),
      backoff_base_ms: default_backoff_base_ms(),
      backoff_max_ms: default_backoff_max_ms(),
      probe_timeout_ms: default_probe_timeout_ms(),
      user_agent: default_user_agent(),
      accept_language: default_accept_language(),
    }
  }
}

impl HttpConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }

  pub fn backoff_base(&self) -> Duration {
    Duration::from_millis(self.backoff_base_ms)
  }

  pub fn backoff_max(&self) -> Duration {
    Duration::from_millis(self.backoff_max_ms)
  }

  pub fn probe_timeout(&self) -> Duration {
    Duration::from_millis(self.probe_timeout_ms)
  }
}
