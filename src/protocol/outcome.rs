use serde::{Deserialize, Serialize};

use super::{audit::PipelineStepRecord, request::ExtractionRequest};
use crate::common::{errors::ErrorKind, tracer::CorrelationId};

/// A fully validated stream address plus the trail that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSuccess {
  pub request_id: CorrelationId,
  pub provider: String,
  pub primary_url: String,
  pub alternate_urls: Vec<String>,
  pub decoder: String,
  pub duration_ms: u64,
  pub steps: Vec<PipelineStepRecord>,
}

/// What one provider attempt looked like when the whole call failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttempt {
  pub provider: String,
  pub duration_ms: u64,
  pub error: ErrorKind,
  pub stage: super::audit::Stage,
  pub message: String,
  pub steps: Vec<PipelineStepRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFailure {
  pub request_id: CorrelationId,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub provider: Option<String>,
  pub error: ErrorKind,
  pub stage: super::audit::Stage,
  pub message: String,
  pub request: ExtractionRequest,
  pub duration_ms: u64,
  pub steps: Vec<PipelineStepRecord>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub attempts: Vec<ProviderAttempt>,
}

/// Terminal state of an extraction call. Never carries a partially validated URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ExtractionOutcome {
  Succeeded(StreamSuccess),
  Failed(StreamFailure),
}

impl ExtractionOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, Self::Succeeded(_))
  }

  pub fn request_id(&self) -> &CorrelationId {
    match self {
      Self::Succeeded(s) => &s.request_id,
      Self::Failed(f) => &f.request_id,
    }
  }

  pub fn steps(&self) -> &[PipelineStepRecord] {
    match self {
      Self::Succeeded(s) => &s.steps,
      Self::Failed(f) => &f.steps,
    }
  }

  pub fn error(&self) -> Option<ErrorKind> {
    match self {
      Self::Succeeded(_) => None,
      Self::Failed(f) => Some(f.error),
    }
  }

  pub fn primary_url(&self) -> Option<&str> {
    match self {
      Self::Succeeded(s) => Some(&s.primary_url),
      Self::Failed(_) => None,
    }
  }

  pub fn into_result(self) -> Result<StreamSuccess, StreamFailure> {
    match self {
      Self::Succeeded(s) => Ok(s),
      Self::Failed(f) => Err(f),
    }
  }
}

impl From<StreamFailure> for ProviderAttempt {
  fn from(failure: StreamFailure) -> Self {
    Self {
      provider: failure.provider.unwrap_or_default(),
      duration_ms: failure.duration_ms,
      error: failure.error,
      stage: failure.stage,
      message: failure.message,
      steps: failure.steps,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::audit::Stage;

  #[test]
  fn test_failure_serializes_with_status_tag() {
    let outcome = ExtractionOutcome::Failed(StreamFailure {
      request_id: CorrelationId::parse("1700000000000-abcd1234").unwrap(),
      provider: Some("alpha".into()),
      error: ErrorKind::NotFound,
      stage: Stage::ExtractHash,
      message: "no hash".into(),
      request: ExtractionRequest::movie("tt1"),
      duration_ms: 12,
      steps: vec![],
      attempts: vec![],
    });

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error"], "NOT_FOUND");
    assert_eq!(json["stage"], "extract-hash");
    assert_eq!(json["requestId"], "1700000000000-abcd1234");
    assert_eq!(json["request"]["contentId"], "tt1");
    assert!(json.get("attempts").is_none());
    assert_eq!(outcome.error(), Some(ErrorKind::NotFound));
    assert!(outcome.primary_url().is_none());
  }
}
