use serde::Serialize;
use tracing::{debug, warn};

use super::placeholder::PLACEHOLDER;
use crate::common::{
  errors::ErrorKind,
  http::{FetchClient, FetchOptions},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Check {
  Scheme,
  Placeholders,
  Host,
  Suffix,
  Reachability,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
  pub valid: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<ErrorKind>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub check: Option<Check>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
}

impl ValidationOutcome {
  pub fn ok() -> Self {
    Self {
      valid: true,
      error: None,
      check: None,
      reason: None,
    }
  }

  fn fail(check: Check, kind: ErrorKind, reason: impl Into<String>) -> Self {
    Self {
      valid: false,
      error: Some(kind),
      check: Some(check),
      reason: Some(reason.into()),
    }
  }
}

/// Structural checks on a candidate stream URL, run in order and stopping at
/// the first failure.
#[derive(Debug, Clone)]
pub struct StreamValidator {
  required_suffix: String,
}

impl Default for StreamValidator {
  fn default() -> Self {
    Self::new(".m3u8")
  }
}

impl StreamValidator {
  pub fn new(required_suffix: impl Into<String>) -> Self {
    Self {
      required_suffix: required_suffix.into(),
    }
  }

  pub fn validate(&self, url: &str) -> ValidationOutcome {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
      return ValidationOutcome::fail(
        Check::Scheme,
        ErrorKind::FormatInvalid,
        "URL must start with http:// or https://",
      );
    }

    let leftover: Vec<&str> = PLACEHOLDER.find_iter(url).map(|m| m.as_str()).collect();
    if !leftover.is_empty() {
      return ValidationOutcome::fail(
        Check::Placeholders,
        ErrorKind::FormatInvalid,
        format!("URL contains unresolved placeholders: {}", leftover.join(", ")),
      );
    }

    let parsed = match url::Url::parse(url) {
      Ok(parsed) => parsed,
      Err(e) => {
        return ValidationOutcome::fail(
          Check::Host,
          ErrorKind::FormatInvalid,
          format!("invalid URL format: {}", e),
        );
      }
    };
    match parsed.host_str() {
      None | Some("") => {
        return ValidationOutcome::fail(
          Check::Host,
          ErrorKind::FormatInvalid,
          "URL must have a hostname",
        );
      }
      Some(host) if !host.contains('.') => {
        return ValidationOutcome::fail(
          Check::Host,
          ErrorKind::FormatInvalid,
          format!("hostname '{}' is not a dotted domain", host),
        );
      }
      Some(_) => {}
    }

    if !self.required_suffix.is_empty()
      && !url
        .to_ascii_lowercase()
        .contains(&self.required_suffix.to_ascii_lowercase())
    {
      return ValidationOutcome::fail(
        Check::Suffix,
        ErrorKind::FormatInvalid,
        format!("URL must contain {}", self.required_suffix),
      );
    }

    ValidationOutcome::ok()
  }

  /// Structural checks followed by a HEAD probe. The probe is never part of
  /// [`validate`](Self::validate).
  pub async fn validate_reachable(
    &self,
    url: &str,
    client: &FetchClient,
    opts: &FetchOptions,
  ) -> ValidationOutcome {
    let outcome = self.validate(url);
    if !outcome.valid {
      return outcome;
    }

    match client.probe(url, opts).await {
      Ok(true) => {
        debug!(url, "stream reachable");
        outcome
      }
      Ok(false) => {
        warn!(url, "stream answered with an error status");
        ValidationOutcome::fail(
          Check::Reachability,
          ErrorKind::NetworkError,
          "stream answered with an error status",
        )
      }
      Err(err) => {
        warn!(url, "stream probe failed: {}", err);
        ValidationOutcome::fail(Check::Reachability, err.kind(), err.to_string())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
  };

  use super::*;
  use crate::configs::HttpConfig;

  #[test]
  fn test_valid_stream_url() {
    let outcome = StreamValidator::default().validate("https://example.test/path/master.m3u8");
    assert_eq!(outcome, ValidationOutcome::ok());
  }

  #[test]
  fn test_checks_run_in_order() {
    let v = StreamValidator::default();
    assert_eq!(v.validate("ftp://example.test/a.m3u8").check, Some(Check::Scheme));
    assert_eq!(v.validate("https://localhost/a.m3u8").check, Some(Check::Host));
    assert_eq!(v.validate("https://example.test/a.mp4").check, Some(Check::Suffix));
  }

  #[test]
  fn test_leftover_placeholder_rejected_even_when_well_formed() {
    let outcome = StreamValidator::default().validate("https://cdn.example.test/{v1}/master.m3u8");
    assert!(!outcome.valid);
    assert_eq!(outcome.error, Some(ErrorKind::FormatInvalid));
    assert_eq!(outcome.check, Some(Check::Placeholders));
    assert!(outcome.reason.unwrap().contains("{v1}"));

    let in_host = StreamValidator::default().validate("https://{v1}/master.m3u8");
    assert_eq!(in_host.check, Some(Check::Placeholders));
  }

  #[tokio::test]
  async fn test_probe_runs_only_when_asked() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
      .and(path("/dead/master.m3u8"))
      .respond_with(ResponseTemplate::new(404))
      .expect(1)
      .mount(&server)
      .await;

    let url = format!("{}/dead/master.m3u8", server.uri());
    let v = StreamValidator::default();
    assert!(v.validate(&url).valid);

    let client = FetchClient::new(&HttpConfig::default()).unwrap();
    let outcome = v.validate_reachable(&url, &client, &client.options()).await;
    assert_eq!(outcome.check, Some(Check::Reachability));
    assert_eq!(outcome.error, Some(ErrorKind::NetworkError));
    assert!(!outcome.valid);
  }
}
