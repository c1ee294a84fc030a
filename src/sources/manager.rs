use std::{sync::Arc, time::Duration};

use futures::{StreamExt, stream::FuturesUnordered};
use tokio::time::Instant;

use super::{
  orchestrator::ProviderOrchestrator,
  plugin::{BoxedSource, CallContext, DecodeFallback},
};
use crate::{
  common::{errors::ErrorKind, http::FetchClient, types::AnyResult},
  configs::Config,
  decoders::{DecodeCascade, DecoderStats},
  extractors::{PatternStats, PatternStore},
  protocol::{
    CallOptions, ExtractionOutcome, ExtractionRequest, ProviderAttempt, Stage,
    StreamFailure,
    audit::{StepAudit, millis},
  },
};

/// Source Manager
pub struct SourceManager {
  sources: Vec<BoxedSource>,
  store: PatternStore,
  cascade: Option<Arc<DecodeCascade>>,
  default_budget: Option<Duration>,
}

impl SourceManager {
  /// Builds one orchestrator per enabled provider, lowest priority first.
  pub fn new(config: &Config) -> AnyResult<Self> {
    Self::build(config, None)
  }

  pub fn with_fallback(config: &Config, fallback: Arc<dyn DecodeFallback>) -> AnyResult<Self> {
    Self::build(config, Some(fallback))
  }

  fn build(config: &Config, fallback: Option<Arc<dyn DecodeFallback>>) -> AnyResult<Self> {
    let client = FetchClient::new(&config.http)?;
    let store = PatternStore::new();
    let cascade = Arc::new(DecodeCascade::new(config.extraction.adaptive_decoders));
    let mut sources: Vec<BoxedSource> = Vec::new();

    macro_rules! register_source {
      ($provider:expr) => {{
        let provider = $provider;
        let mut orch = ProviderOrchestrator::new(
          provider,
          config,
          client.clone(),
          store.clone(),
          cascade.clone(),
        )?;
        if let Some(fallback) = &fallback {
          orch = orch.with_fallback(fallback.clone());
        }
        tracing::info!(
          "Loaded provider: {} (priority {})",
          provider.display_name(),
          provider.priority
        );
        sources.push(Box::new(orch));
      }};
    }

    for provider in &config.providers {
      if provider.enabled {
        register_source!(provider);
      } else {
        tracing::debug!("Provider disabled: {}", provider.name);
      }
    }

    if sources.is_empty() {
      tracing::warn!("No providers enabled, every extraction will fail");
    }

    let mut manager = Self::from_sources(sources);
    manager.store = store;
    manager.cascade = Some(cascade);
    manager.default_budget = config.extraction.call_timeout();
    Ok(manager)
  }

  /// Wraps already-built sources. Used for custom providers and tests.
  pub fn from_sources(mut sources: Vec<BoxedSource>) -> Self {
    sources.sort_by_key(|s| s.priority());
    Self {
      sources,
      store: PatternStore::new(),
      cascade: None,
      default_budget: None,
    }
  }

  /// Budget applied to calls that do not set their own deadline.
  pub fn with_budget(mut self, budget: Option<Duration>) -> Self {
    self.default_budget = budget;
    self
  }

  /// Get names of all registered providers, in fallback order
  pub fn providers(&self) -> Vec<String> {
    self.sources.iter().map(|s| s.name().to_string()).collect()
  }

  pub fn pattern_store(&self) -> &PatternStore {
    &self.store
  }

  pub fn pattern_stats(&self) -> Vec<(String, PatternStats)> {
    self.store.snapshot().into_iter().collect()
  }

  pub fn decoder_stats(&self) -> Vec<(String, DecoderStats)> {
    self.cascade
      .as_ref()
      .map(|c| c.stats())
      .unwrap_or_default()
  }

  fn reject(
    &self,
    request: &ExtractionRequest,
    ctx: &CallContext,
    error: ErrorKind,
    stage: Stage,
    message: String,
  ) -> ExtractionOutcome {
    tracing::warn!(
      request_id = ctx.request_id.as_str(),
      component = "manager",
      error = error.as_str(),
      failed_stage = stage.as_str(),
      "{}",
      message
    );
    let mut audit = StepAudit::new();
    audit.failure(stage, std::time::Instant::now(), error, message.as_str());
    ExtractionOutcome::Failed(StreamFailure {
      request_id: ctx.request_id.clone(),
      provider: None,
      error,
      stage,
      message,
      request: request.clone(),
      duration_ms: millis(ctx.elapsed()),
      steps: audit.into_records(),
      attempts: Vec::new(),
    })
  }

  /// Checks run before any provider is touched.
  fn preflight(&self, request: &ExtractionRequest, ctx: &CallContext) -> Option<ExtractionOutcome> {
    if let Err(e) = request.validate() {
      return Some(self.reject(
        request,
        ctx,
        ErrorKind::InvalidRequest,
        Stage::ValidateRequest,
        e.to_string(),
      ));
    }
    if self.sources.is_empty() {
      return Some(self.reject(
        request,
        ctx,
        ErrorKind::AllProvidersFailed,
        Stage::SelectProvider,
        "no providers configured".into(),
      ));
    }
    None
  }

  /// One failed provider reports its own failure; several are folded into
  /// `ALL_PROVIDERS_FAILED` carrying each attempt.
  fn combine(
    &self,
    request: &ExtractionRequest,
    ctx: &CallContext,
    mut failures: Vec<(StreamFailure, u64)>,
  ) -> ExtractionOutcome {
    if failures.len() <= 1 {
      return match failures.pop() {
        Some((mut failure, _)) => {
          failure.duration_ms = millis(ctx.elapsed());
          ExtractionOutcome::Failed(failure)
        }
        None => {
          let error = if ctx.cancel.is_cancelled() {
            ErrorKind::Cancelled
          } else {
            ErrorKind::Timeout
          };
          self.reject(
            request,
            ctx,
            error,
            Stage::SelectProvider,
            "call ended before any provider ran".into(),
          )
        }
      };
    }

    let stage = failures
      .last()
      .map(|(f, _)| f.stage)
      .unwrap_or(Stage::SelectProvider);
    let summary = failures
      .iter()
      .map(|(f, _)| {
        format!(
          "{}: {} at {}",
          f.provider.as_deref().unwrap_or("?"),
          f.error,
          f.stage
        )
      })
      .collect::<Vec<_>>()
      .join("; ");
    let steps = failures
      .iter()
      .flat_map(|(f, _)| f.steps.iter().cloned())
      .collect();
    let attempts = failures
      .into_iter()
      .map(|(f, elapsed)| ProviderAttempt {
        duration_ms: elapsed,
        ..ProviderAttempt::from(f)
      })
      .collect::<Vec<_>>();
    let message = format!("all {} providers failed: {}", attempts.len(), summary);

    tracing::warn!(
      request_id = ctx.request_id.as_str(),
      component = "manager",
      providers = attempts.len() as u64,
      duration_ms = millis(ctx.elapsed()),
      "{}",
      message
    );

    ExtractionOutcome::Failed(StreamFailure {
      request_id: ctx.request_id.clone(),
      provider: None,
      error: ErrorKind::AllProvidersFailed,
      stage,
      message,
      request: request.clone(),
      duration_ms: millis(ctx.elapsed()),
      steps,
      attempts,
    })
  }

  /// Tries providers one after another until one yields a validated URL.
  pub async fn extract(&self, request: &ExtractionRequest, options: CallOptions) -> ExtractionOutcome {
    let ctx = CallContext::new(options, self.default_budget);
    if let Some(rejected) = self.preflight(request, &ctx) {
      return rejected;
    }

    let mut failures = Vec::new();
    for source in &self.sources {
      if ctx.cancel.is_cancelled() || ctx.is_expired() {
        break;
      }

      tracing::trace!("Extracting '{}' with provider: {}", request, source.name());
      let started = Instant::now();
      match source.extract(request, &ctx).await {
        ExtractionOutcome::Succeeded(success) => {
          return ExtractionOutcome::Succeeded(success);
        }
        ExtractionOutcome::Failed(failure) => {
          tracing::debug!(
            request_id = ctx.request_id.as_str(),
            provider = source.name(),
            error = failure.error.as_str(),
            "provider failed, trying next"
          );
          failures.push((failure, millis(started.elapsed())));
        }
      }
    }

    self.combine(request, &ctx, failures)
  }

  /// Runs a single named provider.
  pub async fn extract_with(
    &self,
    provider: &str,
    request: &ExtractionRequest,
    options: CallOptions,
  ) -> ExtractionOutcome {
    let ctx = CallContext::new(options, self.default_budget);
    if let Some(rejected) = self.preflight(request, &ctx) {
      return rejected;
    }

    match self
      .sources
      .iter()
      .find(|s| s.name().eq_ignore_ascii_case(provider))
    {
      Some(source) => source.extract(request, &ctx).await,
      None => self.reject(
        request,
        &ctx,
        ErrorKind::InvalidRequest,
        Stage::SelectProvider,
        format!("unknown provider: {}", provider),
      ),
    }
  }

  /// Runs every provider at once and keeps the first success; the rest are
  /// cancelled.
  pub async fn extract_racing(
    &self,
    request: &ExtractionRequest,
    options: CallOptions,
  ) -> ExtractionOutcome {
    let ctx = CallContext::new(options, self.default_budget);
    if let Some(rejected) = self.preflight(request, &ctx) {
      return rejected;
    }

    // Cancelling the race must not cancel the caller's token.
    let race = ctx.child();
    let mut running = self
      .sources
      .iter()
      .map(|source| {
        let lane = race.child();
        async move {
          let started = Instant::now();
          let outcome = source.extract(request, &lane).await;
          (outcome, millis(started.elapsed()))
        }
      })
      .collect::<FuturesUnordered<_>>();

    let mut failures = Vec::new();
    while let Some((outcome, elapsed)) = running.next().await {
      match outcome {
        ExtractionOutcome::Succeeded(success) => {
          race.cancel.cancel();
          tracing::debug!(
            request_id = ctx.request_id.as_str(),
            provider = success.provider.as_str(),
            pending = running.len() as u64,
            "race won"
          );
          return ExtractionOutcome::Succeeded(success);
        }
        ExtractionOutcome::Failed(failure) => failures.push((failure, elapsed)),
      }
    }

    self.combine(request, &ctx, failures)
  }

  /// Runs [`extract`](Self::extract) for each request with at most
  /// `concurrency` in flight. Results keep the input order and every request
  /// gets its own id.
  pub async fn extract_batch(
    &self,
    requests: &[ExtractionRequest],
    options: CallOptions,
    concurrency: usize,
  ) -> Vec<ExtractionOutcome> {
    let mut indexed = futures::stream::iter(requests.iter().enumerate())
      .map(|(index, request)| {
        let options = CallOptions {
          request_id: None,
          ..options.clone()
        };
        async move { (index, self.extract(request, options).await) }
      })
      .buffer_unordered(concurrency.max(1))
      .collect::<Vec<_>>()
      .await;

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, outcome)| outcome).collect()
  }
}
