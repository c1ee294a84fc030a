use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
  common::tracer::CorrelationId,
  decoders::DecodedResult,
  extractors::HiddenPayload,
  protocol::{CallOptions, ExtractionOutcome, ExtractionRequest},
};

/// Trait that every relay provider implements.
///
/// A source takes a validated content locator through its whole pipeline and
/// always answers with a terminal outcome; it never returns a partially
/// validated URL.
#[async_trait]
pub trait StreamSource: Send + Sync {
  /// Unique identifier for this source (e.g. "alpha").
  fn name(&self) -> &str;

  /// Lower runs first when the manager falls back across sources.
  fn priority(&self) -> u32;

  async fn extract(&self, request: &ExtractionRequest, ctx: &CallContext) -> ExtractionOutcome;
}

pub type BoxedSource = Box<dyn StreamSource>;

/// Degraded decoding path (e.g. a headless browser running the page's own
/// script). Consulted only after the cascade is exhausted.
#[async_trait]
pub trait DecodeFallback: Send + Sync {
  fn name(&self) -> &str;

  async fn decode(&self, payload: &HiddenPayload, page_url: &str) -> Option<DecodedResult>;
}

/// State shared by every stage of one extraction call.
#[derive(Debug, Clone)]
pub struct CallContext {
  pub request_id: CorrelationId,
  pub options: CallOptions,
  pub cancel: CancellationToken,
  pub deadline: Option<Instant>,
  pub started: Instant,
}

impl CallContext {
  /// `default_budget` applies when the options carry no deadline of their own.
  pub fn new(options: CallOptions, default_budget: Option<Duration>) -> Self {
    let started = Instant::now();
    let deadline = options.deadline.or(default_budget).map(|b| started + b);
    Self {
      request_id: options
        .request_id
        .clone()
        .unwrap_or_else(CorrelationId::generate),
      cancel: options.cancel.clone().unwrap_or_else(CancellationToken::new),
      deadline,
      started,
      options,
    }
  }

  /// Same call, with a token that can be cancelled without touching the parent.
  pub fn child(&self) -> Self {
    Self {
      cancel: self.cancel.child_token(),
      ..self.clone()
    }
  }

  pub fn is_expired(&self) -> bool {
    self.deadline.is_some_and(|d| Instant::now() >= d)
  }

  pub fn elapsed(&self) -> Duration {
    self.started.elapsed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_context_uses_caller_id_and_budget() {
    let id = CorrelationId::generate();
    let ctx = CallContext::new(
      CallOptions::default()
        .request_id(id.clone())
        .deadline(Duration::from_millis(0)),
      Some(Duration::from_secs(60)),
    );
    assert_eq!(ctx.request_id, id);
    assert!(ctx.is_expired());

    let open = CallContext::new(CallOptions::default(), None);
    assert!(open.deadline.is_none());
    assert!(!open.is_expired());
  }

  #[tokio::test]
  async fn test_child_cancel_does_not_reach_parent() {
    let parent = CallContext::new(CallOptions::default(), None);
    let child = parent.child();
    child.cancel.cancel();
    assert!(!parent.cancel.is_cancelled());

    let child = parent.child();
    parent.cancel.cancel();
    assert!(child.cancel.is_cancelled());
  }
}
