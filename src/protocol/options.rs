use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::common::tracer::CorrelationId;

/// Per-call overrides. Anything left `None` falls back to configuration.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
  /// Per-attempt fetch timeout.
  pub timeout: Option<Duration>,
  pub retries: Option<u32>,
  /// Sent as `Referer` (and `Origin`) on every fetch of the call.
  pub referer: Option<String>,
  pub check_availability: Option<bool>,
  /// Budget for the whole call, measured from its start.
  pub deadline: Option<Duration>,
  pub cancel: Option<CancellationToken>,
  /// Reuse a caller-minted id instead of generating one.
  pub request_id: Option<CorrelationId>,
}

impl CallOptions {
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn retries(mut self, retries: u32) -> Self {
    self.retries = Some(retries);
    self
  }

  pub fn referer(mut self, referer: impl Into<String>) -> Self {
    self.referer = Some(referer.into());
    self
  }

  pub fn check_availability(mut self, check: bool) -> Self {
    self.check_availability = Some(check);
    self
  }

  pub fn deadline(mut self, budget: Duration) -> Self {
    self.deadline = Some(budget);
    self
  }

  pub fn cancel(mut self, token: CancellationToken) -> Self {
    self.cancel = Some(token);
    self
  }

  pub fn request_id(mut self, id: CorrelationId) -> Self {
    self.request_id = Some(id);
    self
  }
}
