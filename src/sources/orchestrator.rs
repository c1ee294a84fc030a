use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::plugin::{CallContext, DecodeFallback, StreamSource};
use crate::{
  common::{
    errors::{ConfigError, ErrorKind, FetchError},
    http::{FetchClient, FetchOptions, FetchResponse},
  },
  configs::{Config, ProviderConfig},
  decoders::{DecodeCascade, DecodedResult},
  extractors::{
    ExtractContext, HashExtractor, HiddenPayload, PatternStore, PayloadExtractor,
    RelayExtractor,
  },
  protocol::{
    ContentKind, ExtractionOutcome, ExtractionRequest, Stage, StepAudit, StreamFailure,
    StreamSuccess, audit::millis,
  },
  resolve::{PlaceholderResolver, ResolvedUrlSet, StreamValidator},
};

/// Pipeline position. Each variant owns exactly what the next stage consumes.
enum State {
  BuildEntryUrl,
  FetchEntry {
    entry_url: String,
  },
  ExtractHash {
    entry_url: String,
    html: String,
  },
  FetchRelay {
    entry_url: String,
    hash: String,
  },
  ExtractSecondaryUrl {
    relay_url: String,
    html: String,
  },
  FetchSecondary {
    relay_url: String,
    secondary_url: String,
  },
  ExtractPayload {
    secondary_url: String,
    html: String,
  },
  Decode {
    secondary_url: String,
    payload: HiddenPayload,
  },
  ResolvePlaceholders {
    decoded: DecodedResult,
  },
  Validate {
    decoded: DecodedResult,
    urls: ResolvedUrlSet,
  },
}

impl State {
  fn stage(&self) -> Stage {
    match self {
      Self::BuildEntryUrl => Stage::BuildEntryUrl,
      Self::FetchEntry { .. } => Stage::FetchEntry,
      Self::ExtractHash { .. } => Stage::ExtractHash,
      Self::FetchRelay { .. } => Stage::FetchRelay,
      Self::ExtractSecondaryUrl { .. } => Stage::ExtractSecondaryUrl,
      Self::FetchSecondary { .. } => Stage::FetchSecondary,
      Self::ExtractPayload { .. } => Stage::ExtractPayload,
      Self::Decode { .. } => Stage::Decode,
      Self::ResolvePlaceholders { .. } => Stage::ResolvePlaceholders,
      Self::Validate { .. } => Stage::Validate,
    }
  }
}

struct Validated {
  urls: ResolvedUrlSet,
  decoder: String,
}

enum Transition {
  Next(State),
  Done(Validated),
}

struct Step {
  transition: Transition,
  detail: Option<Value>,
}

impl Step {
  fn next(state: State, detail: Value) -> Self {
    Self {
      transition: Transition::Next(state),
      detail: Some(detail),
    }
  }
}

struct StageFailure {
  kind: ErrorKind,
  message: String,
}

impl StageFailure {
  fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }
}

impl From<FetchError> for StageFailure {
  fn from(err: FetchError) -> Self {
    Self::new(err.kind(), err.to_string())
  }
}

fn fetch_detail(resp: &FetchResponse) -> Value {
  json!({
    "url": resp.url,
    "status": resp.status,
    "attempts": resp.attempts,
    "bytes": resp.body.len(),
  })
}

fn check_template(
  provider: &str,
  template: &str,
  placeholders: &[&'static str],
) -> Result<(), ConfigError> {
  for placeholder in placeholders {
    if !template.contains(placeholder) {
      return Err(ConfigError::Template {
        provider: provider.to_string(),
        template: template.to_string(),
        placeholder,
      });
    }
  }
  Ok(())
}

/// Runs one provider's pipeline as a linear state machine:
/// entry page, hash, relay page, secondary URL, payload page, hidden payload,
/// decode, placeholders, validation.
///
/// Each transition is timed and appended to the audit trail whatever its
/// outcome, and the first failing stage ends the run.
pub struct ProviderOrchestrator {
  config: ProviderConfig,
  client: FetchClient,
  hash: HashExtractor,
  relay: RelayExtractor,
  payload: PayloadExtractor,
  cascade: Arc<DecodeCascade>,
  resolver: PlaceholderResolver,
  validator: StreamValidator,
  check_availability: bool,
  fallback: Option<Arc<dyn DecodeFallback>>,
}

impl ProviderOrchestrator {
  pub fn new(
    provider: &ProviderConfig,
    config: &Config,
    client: FetchClient,
    store: PatternStore,
    cascade: Arc<DecodeCascade>,
  ) -> Result<Self, ConfigError> {
    let name = provider.name.as_str();
    check_template(name, &provider.entry_movie, &["{id}"])?;
    check_template(
      name,
      &provider.entry_episode,
      &["{id}", "{season}", "{episode}"],
    )?;
    check_template(name, &provider.relay_url, &["{hash}"])?;

    let extraction = &config.extraction;
    Ok(Self {
      hash: HashExtractor::new(
        name,
        provider.display_name(),
        &provider.hash_patterns,
        extraction.hash,
        store.clone(),
      )?,
      relay: RelayExtractor::new(
        name,
        &provider.secondary_base,
        &provider.relay_patterns,
        extraction.relay,
        store.clone(),
      )?,
      payload: PayloadExtractor::new(
        name,
        &provider.payload_patterns,
        extraction.payload,
        store,
      )?,
      cascade,
      resolver: PlaceholderResolver::new(config.placeholders.clone()),
      validator: StreamValidator::new(extraction.required_suffix.clone()),
      check_availability: extraction.check_availability,
      config: provider.clone(),
      client,
      fallback: None,
    })
  }

  pub fn with_fallback(mut self, fallback: Arc<dyn DecodeFallback>) -> Self {
    self.fallback = Some(fallback);
    self
  }

  pub fn entry_url(&self, request: &ExtractionRequest) -> String {
    let id = urlencoding::encode(&request.content_id);
    match request.kind {
      ContentKind::Movie => self.config.entry_movie.replace("{id}", &id),
      ContentKind::Episode => self
        .config
        .entry_episode
        .replace("{id}", &id)
        .replace("{season}", &request.season.unwrap_or_default().to_string())
        .replace("{episode}", &request.episode.unwrap_or_default().to_string()),
    }
  }

  pub fn relay_url(&self, hash: &str) -> String {
    self.config.relay_url.replace("{hash}", hash)
  }

  fn fetch_options(&self, ctx: &CallContext, referer: Option<&str>) -> FetchOptions {
    let mut opts = self.client.options();
    let provider_timeout = self.config.timeout_ms.map(Duration::from_millis);
    if let Some(timeout) = ctx.options.timeout.or(provider_timeout) {
      opts.timeout = timeout;
    }
    if let Some(retries) = ctx.options.retries.or(self.config.retries) {
      opts.retries = retries;
    }
    opts.referer = ctx
      .options
      .referer
      .clone()
      .or_else(|| referer.map(str::to_string));
    opts.deadline = ctx.deadline;
    opts.cancel = ctx.cancel.clone();
    opts
  }

  async fn fetch_page(
    &self,
    url: &str,
    ctx: &CallContext,
    referer: Option<&str>,
  ) -> Result<FetchResponse, StageFailure> {
    let opts = self.fetch_options(ctx, referer);
    Ok(self.client.fetch(url, &opts).await?)
  }

  async fn step(
    &self,
    state: State,
    request: &ExtractionRequest,
    ctx: &CallContext,
  ) -> Result<Step, StageFailure> {
    let rid = ctx.request_id.as_str();
    let ex_ctx = ExtractContext {
      request_id: rid,
      provider: &self.config.name,
    };

    match state {
      State::BuildEntryUrl => {
        let entry_url = self.entry_url(request);
        let detail = json!({ "url": entry_url });
        Ok(Step::next(State::FetchEntry { entry_url }, detail))
      }
      State::FetchEntry { entry_url } => {
        let resp = self.fetch_page(&entry_url, ctx, None).await?;
        let detail = fetch_detail(&resp);
        Ok(Step::next(
          State::ExtractHash {
            entry_url,
            html: resp.body,
          },
          detail,
        ))
      }
      State::ExtractHash { entry_url, html } => {
        let found = self.hash.extract(&html, &ex_ctx).ok_or_else(|| {
          StageFailure::new(ErrorKind::NotFound, "no relay hash found on the entry page")
        })?;
        let detail = json!({ "pattern": found.pattern, "length": found.value.len() });
        Ok(Step::next(
          State::FetchRelay {
            entry_url,
            hash: found.value,
          },
          detail,
        ))
      }
      State::FetchRelay { entry_url, hash } => {
        let relay_url = self.relay_url(&hash);
        let resp = self.fetch_page(&relay_url, ctx, Some(&entry_url)).await?;
        let detail = fetch_detail(&resp);
        Ok(Step::next(
          State::ExtractSecondaryUrl {
            relay_url,
            html: resp.body,
          },
          detail,
        ))
      }
      State::ExtractSecondaryUrl { relay_url, html } => {
        let target = self.relay.extract(&html, &ex_ctx).ok_or_else(|| {
          StageFailure::new(ErrorKind::NotFound, "no secondary relay URL on the relay page")
        })?;
        let detail = json!({ "pattern": target.pattern, "url": target.url });
        Ok(Step::next(
          State::FetchSecondary {
            relay_url,
            secondary_url: target.url,
          },
          detail,
        ))
      }
      State::FetchSecondary {
        relay_url,
        secondary_url,
      } => {
        let resp = self
          .fetch_page(&secondary_url, ctx, Some(&relay_url))
          .await?;
        let detail = fetch_detail(&resp);
        Ok(Step::next(
          State::ExtractPayload {
            secondary_url,
            html: resp.body,
          },
          detail,
        ))
      }
      State::ExtractPayload {
        secondary_url,
        html,
      } => {
        let payload = self.payload.extract(&html, &ex_ctx).ok_or_else(|| {
          StageFailure::new(ErrorKind::NotFound, "no hidden payload on the secondary page")
        })?;
        let detail = json!({
          "pattern": payload.pattern,
          "containerId": payload.container_id,
          "length": payload.encoded.len(),
        });
        Ok(Step::next(
          State::Decode {
            secondary_url,
            payload,
          },
          detail,
        ))
      }
      State::Decode {
        secondary_url,
        payload,
      } => {
        let key = payload.container_id.as_deref();
        if let Some(decoded) = self.cascade.decode_traced(&payload.encoded, key, rid) {
          let detail = json!({ "decoder": decoded.decoder });
          return Ok(Step::next(State::ResolvePlaceholders { decoded }, detail));
        }

        let Some(fallback) = &self.fallback else {
          return Err(StageFailure::new(
            ErrorKind::DecodeExhausted,
            "no decoder produced a URL",
          ));
        };
        warn!(
          request_id = rid,
          provider = self.config.name.as_str(),
          component = "orchestrator",
          fallback = fallback.name(),
          "decode cascade exhausted, trying fallback"
        );
        match fallback.decode(&payload, &secondary_url).await {
          Some(decoded) if crate::decoders::looks_like_url(&decoded.plaintext) => {
            let detail = json!({ "decoder": decoded.decoder, "fallback": fallback.name() });
            Ok(Step::next(State::ResolvePlaceholders { decoded }, detail))
          }
          _ => Err(StageFailure::new(
            ErrorKind::DecodeExhausted,
            format!("no decoder produced a URL, fallback '{}' included", fallback.name()),
          )),
        }
      }
      State::ResolvePlaceholders { decoded } => {
        let urls = self.resolver.resolve_all(&decoded.plaintext).ok_or_else(|| {
          StageFailure::new(ErrorKind::FormatInvalid, "decoded payload holds no URL")
        })?;
        let detail = json!({ "count": urls.len() });
        Ok(Step::next(State::Validate { decoded, urls }, detail))
      }
      State::Validate { decoded, urls } => {
        let check = ctx
          .options
          .check_availability
          .unwrap_or(self.check_availability);
        let mut valid = Vec::new();
        let mut first_rejection = None;

        for url in urls.iter() {
          let outcome = if check {
            let opts = self.fetch_options(ctx, None);
            self.validator
              .validate_reachable(url, &self.client, &opts)
              .await
          } else {
            self.validator.validate(url)
          };
          if outcome.valid {
            valid.push(url.to_string());
          } else if first_rejection.is_none() {
            first_rejection = Some(outcome);
          }
        }

        match ResolvedUrlSet::from_urls(valid) {
          Some(urls) => Ok(Step {
            detail: Some(json!({ "valid": urls.len(), "probed": check })),
            transition: Transition::Done(Validated {
              urls,
              decoder: decoded.decoder,
            }),
          }),
          None => {
            let (kind, reason) = first_rejection
              .map(|r| {
                (
                  r.error.unwrap_or(ErrorKind::FormatInvalid),
                  r.reason.unwrap_or_default(),
                )
              })
              .unwrap_or((ErrorKind::FormatInvalid, "no candidate URL".into()));
            Err(StageFailure::new(kind, reason))
          }
        }
      }
    }
  }

  fn fail(
    &self,
    request: &ExtractionRequest,
    ctx: &CallContext,
    stage: Stage,
    kind: ErrorKind,
    message: String,
    audit: StepAudit,
  ) -> ExtractionOutcome {
    let duration_ms = millis(ctx.elapsed());
    warn!(
      request_id = ctx.request_id.as_str(),
      provider = self.config.name.as_str(),
      component = "orchestrator",
      failed_stage = stage.as_str(),
      error = kind.as_str(),
      duration_ms,
      "extraction failed: {}",
      message
    );
    ExtractionOutcome::Failed(StreamFailure {
      request_id: ctx.request_id.clone(),
      provider: Some(self.config.name.clone()),
      error: kind,
      stage,
      message,
      request: request.clone(),
      duration_ms,
      steps: audit.into_records(),
      attempts: Vec::new(),
    })
  }

  pub async fn run(&self, request: &ExtractionRequest, ctx: &CallContext) -> ExtractionOutcome {
    let rid = ctx.request_id.as_str();
    let mut audit = StepAudit::new();

    let started = Instant::now();
    if let Err(e) = request.validate() {
      audit.failure(
        Stage::ValidateRequest,
        started.into_std(),
        ErrorKind::InvalidRequest,
        e.to_string(),
      );
      return self.fail(
        request,
        ctx,
        Stage::ValidateRequest,
        ErrorKind::InvalidRequest,
        e.to_string(),
        audit,
      );
    }

    info!(
      request_id = rid,
      provider = self.config.name.as_str(),
      component = "orchestrator",
      content = %request,
      "extraction started"
    );

    let mut state = State::BuildEntryUrl;
    loop {
      let stage = state.stage();
      let started = Instant::now();

      if ctx.cancel.is_cancelled() {
        audit.failure(stage, started.into_std(), ErrorKind::Cancelled, "call cancelled");
        return self.fail(
          request,
          ctx,
          stage,
          ErrorKind::Cancelled,
          "call cancelled".into(),
          audit,
        );
      }
      if ctx.is_expired() {
        audit.failure(stage, started.into_std(), ErrorKind::Timeout, "call deadline passed");
        return self.fail(
          request,
          ctx,
          stage,
          ErrorKind::Timeout,
          "call deadline passed".into(),
          audit,
        );
      }

      match self.step(state, request, ctx).await {
        Ok(step) => {
          debug!(
            request_id = rid,
            provider = self.config.name.as_str(),
            stage = stage.as_str(),
            duration_ms = millis(started.elapsed()),
            "stage complete"
          );
          audit.success(stage, started.into_std(), step.detail);
          match step.transition {
            Transition::Next(next) => state = next,
            Transition::Done(validated) => {
              let duration_ms = millis(ctx.elapsed());
              info!(
                request_id = rid,
                provider = self.config.name.as_str(),
                component = "orchestrator",
                decoder = validated.decoder.as_str(),
                url = validated.urls.primary(),
                duration_ms,
                "extraction succeeded"
              );
              return ExtractionOutcome::Succeeded(StreamSuccess {
                request_id: ctx.request_id.clone(),
                provider: self.config.name.clone(),
                primary_url: validated.urls.primary().to_string(),
                alternate_urls: validated.urls.alternates().to_vec(),
                decoder: validated.decoder,
                duration_ms,
                steps: audit.into_records(),
              });
            }
          }
        }
        Err(failure) => {
          audit.failure(stage, started.into_std(), failure.kind, failure.message.clone());
          return self.fail(request, ctx, stage, failure.kind, failure.message, audit);
        }
      }
    }
  }
}

#[async_trait]
impl StreamSource for ProviderOrchestrator {
  fn name(&self) -> &str {
    &self.config.name
  }

  fn priority(&self) -> u32 {
    self.config.priority
  }

  async fn extract(&self, request: &ExtractionRequest, ctx: &CallContext) -> ExtractionOutcome {
    self.run(request, ctx).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::CallOptions;

  fn provider() -> ProviderConfig {
    ProviderConfig {
      name: "alpha".into(),
      display_name: Some("Alpha Stream".into()),
      enabled: true,
      priority: 0,
      entry_movie: "https://entry.example.test/movie/{id}".into(),
      entry_episode: "https://entry.example.test/tv/{id}/{season}-{episode}".into(),
      relay_url: "https://relay.example.test/rcp/{hash}".into(),
      secondary_base: "https://relay.example.test".into(),
      timeout_ms: None,
      retries: None,
      hash_patterns: vec![],
      relay_patterns: vec![],
      payload_patterns: vec![],
    }
  }

  fn orchestrator(provider: &ProviderConfig) -> Result<ProviderOrchestrator, ConfigError> {
    let config = Config::default();
    ProviderOrchestrator::new(
      provider,
      &config,
      FetchClient::new(&config.http).unwrap(),
      PatternStore::new(),
      Arc::new(DecodeCascade::default()),
    )
  }

  #[test]
  fn test_entry_urls() {
    let orch = orchestrator(&provider()).unwrap();
    assert_eq!(
      orch.entry_url(&ExtractionRequest::movie("tt 01/2")),
      "https://entry.example.test/movie/tt%2001%2F2"
    );
    assert_eq!(
      orch.entry_url(&ExtractionRequest::episode("1399", 2, 5)),
      "https://entry.example.test/tv/1399/2-5"
    );
    assert_eq!(orch.relay_url("abc"), "https://relay.example.test/rcp/abc");
  }

  #[test]
  fn test_template_without_placeholder_rejected() {
    let mut bad = provider();
    bad.relay_url = "https://relay.example.test/rcp".into();
    assert!(matches!(
      orchestrator(&bad),
      Err(ConfigError::Template { placeholder: "{hash}", .. })
    ));
  }

  #[tokio::test]
  async fn test_invalid_request_fails_before_any_fetch() {
    let orch = orchestrator(&provider()).unwrap();
    let mut request = ExtractionRequest::episode("1399", 1, 1);
    request.episode = None;

    let ctx = CallContext::new(CallOptions::default(), None);
    let outcome = orch.run(&request, &ctx).await;
    let failure = outcome.into_result().unwrap_err();
    assert_eq!(failure.error, ErrorKind::InvalidRequest);
    assert_eq!(failure.stage, Stage::ValidateRequest);
    assert_eq!(failure.steps.len(), 1);
  }

  #[tokio::test]
  async fn test_cancelled_call_keeps_trail() {
    let orch = orchestrator(&provider()).unwrap();
    let ctx = CallContext::new(CallOptions::default(), None);
    ctx.cancel.cancel();

    let failure = orch
      .run(&ExtractionRequest::movie("tt1"), &ctx)
      .await
      .into_result()
      .unwrap_err();
    assert_eq!(failure.error, ErrorKind::Cancelled);
    assert_eq!(failure.stage, Stage::BuildEntryUrl);
    assert_eq!(failure.steps.len(), 1);
    assert!(!failure.steps[0].success);
  }
}
