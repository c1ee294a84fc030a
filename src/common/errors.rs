use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification attached to every failed extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
  /// A recognition stage exhausted all of its patterns.
  NotFound,
  /// Every decoder failed the URL-marker check.
  DecodeExhausted,
  NetworkError,
  Timeout,
  /// The final candidate URL failed structural validation.
  FormatInvalid,
  /// The content locator was rejected before any network call.
  InvalidRequest,
  Cancelled,
  AllProvidersFailed,
}

impl ErrorKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::NotFound => "NOT_FOUND",
      Self::DecodeExhausted => "DECODE_EXHAUSTED",
      Self::NetworkError => "NETWORK_ERROR",
      Self::Timeout => "TIMEOUT",
      Self::FormatInvalid => "FORMAT_INVALID",
      Self::InvalidRequest => "INVALID_REQUEST",
      Self::Cancelled => "CANCELLED",
      Self::AllProvidersFailed => "ALL_PROVIDERS_FAILED",
    }
  }

  /// Whether the same call may succeed later without any change on the caller's side.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      Self::NotFound | Self::NetworkError | Self::Timeout | Self::AllProvidersFailed
    )
  }

  /// Only an obfuscation-scheme rotation warrants the degraded decode path.
  pub fn allows_fallback_decoding(&self) -> bool {
    matches!(self, Self::DecodeExhausted)
  }
}

impl std::fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Errors surfaced by the resilient fetch client.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error("request to {url} timed out after {}ms", .timeout.as_millis())]
  Timeout { url: String, timeout: Duration },

  /// Client errors are definitive and never retried.
  #[error("{url} answered with status {status}")]
  Status { url: String, status: u16 },

  #[error("transport error for {url}: {source}")]
  Transport {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("{url} failed after {attempts} attempts: {last}")]
  Exhausted {
    url: String,
    attempts: u32,
    last: Box<FetchError>,
  },

  #[error("request to {url} was cancelled")]
  Cancelled { url: String },
}

impl FetchError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Timeout { .. } => ErrorKind::Timeout,
      Self::Status { .. } | Self::Transport { .. } => ErrorKind::NetworkError,
      Self::Exhausted { last, .. } => last.kind(),
      Self::Cancelled { .. } => ErrorKind::Cancelled,
    }
  }

  /// 4xx answers end the retry loop immediately.
  pub fn is_terminal(&self) -> bool {
    match self {
      Self::Status { status, .. } => (400..500).contains(status),
      Self::Cancelled { .. } => true,
      _ => false,
    }
  }
}

/// Errors raised while turning configuration into runtime components.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("pattern '{name}' is not a valid regex: {source}")]
  Pattern {
    name: String,
    #[source]
    source: regex::Error,
  },

  #[error("pattern '{name}' has no capture group named 'value' or group 1")]
  PatternCapture { name: String },

  #[error("pattern '{name}' is not a valid selector: {reason}")]
  Selector { name: String, reason: String },

  #[error("pattern '{name}' must set exactly one of regex or selector")]
  PatternKind { name: String },

  #[error("provider '{provider}': template '{template}' is missing {placeholder}")]
  Template {
    provider: String,
    template: String,
    placeholder: &'static str,
  },

  #[error("no enabled provider named '{0}'")]
  UnknownProvider(String),

  #[error("failed to read {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{0} is empty")]
  Empty(String),

  #[error("invalid configuration: {0}")]
  Parse(#[from] toml::de::Error),
}
