use std::time::Duration;

/// Exponential retry delay: `base * 2^(attempt - 1)`, capped at `max`.
pub struct Backoff {
  attempt: u32,
  retries: u32,
  base: Duration,
  max: Duration,
}

impl Backoff {
  pub fn new(retries: u32, base: Duration, max: Duration) -> Self {
    Self {
      attempt: 0,
      retries,
      base,
      max,
    }
  }

  pub fn next(&mut self) -> Duration {
    self.attempt += 1;
    let factor = 2u32.saturating_pow((self.attempt - 1).min(16));
    self.base.saturating_mul(factor).min(self.max)
  }

  pub fn is_exhausted(&self) -> bool {
    self.attempt >= self.retries
  }
}
