use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::errors::ErrorKind;

/// Stages of one provider run, in the order they execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
  ValidateRequest,
  SelectProvider,
  BuildEntryUrl,
  FetchEntry,
  ExtractHash,
  FetchRelay,
  ExtractSecondaryUrl,
  FetchSecondary,
  ExtractPayload,
  Decode,
  ResolvePlaceholders,
  Validate,
}

impl Stage {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::ValidateRequest => "validate-request",
      Self::SelectProvider => "select-provider",
      Self::BuildEntryUrl => "build-entry-url",
      Self::FetchEntry => "fetch-entry",
      Self::ExtractHash => "extract-hash",
      Self::FetchRelay => "fetch-relay",
      Self::ExtractSecondaryUrl => "extract-secondary-url",
      Self::FetchSecondary => "fetch-secondary",
      Self::ExtractPayload => "extract-payload",
      Self::Decode => "decode",
      Self::ResolvePlaceholders => "resolve-placeholders",
      Self::Validate => "validate",
    }
  }
}

impl std::fmt::Display for Stage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Append-only audit entry for one stage transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStepRecord {
  pub step: Stage,
  pub success: bool,
  pub duration_ms: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<ErrorKind>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub detail: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepAudit {
  records: Vec<PipelineStepRecord>,
}

impl StepAudit {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn success(&mut self, step: Stage, started: Instant, detail: Option<Value>) {
    self.records.push(PipelineStepRecord {
      step,
      success: true,
      duration_ms: millis(started.elapsed()),
      error: None,
      message: None,
      detail,
    });
  }

  pub fn failure(&mut self, step: Stage, started: Instant, kind: ErrorKind, message: impl Into<String>) {
    self.records.push(PipelineStepRecord {
      step,
      success: false,
      duration_ms: millis(started.elapsed()),
      error: Some(kind),
      message: Some(message.into()),
      detail: None,
    });
  }

  pub fn records(&self) -> &[PipelineStepRecord] {
    &self.records
  }

  pub fn last(&self) -> Option<&PipelineStepRecord> {
    self.records.last()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn into_records(self) -> Vec<PipelineStepRecord> {
    self.records
  }
}

pub(crate) fn millis(d: Duration) -> u64 {
  u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
