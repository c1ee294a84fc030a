use std::time::Duration;

use reqwest::{
  Client, Method, RequestBuilder,
  header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, ORIGIN, REFERER},
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
  common::{backoff::Backoff, errors::FetchError, types::AnyResult},
  configs::HttpConfig,
};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Per-request knobs. Built from [`FetchClient::options`] and overridden per call.
#[derive(Debug, Clone)]
pub struct FetchOptions {
  pub timeout: Duration,
  pub retries: u32,
  pub referer: Option<String>,
  /// Absolute cut-off shared by every stage of one extraction.
  pub deadline: Option<Instant>,
  pub cancel: CancellationToken,
}

impl FetchOptions {
  pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
    self.referer = Some(referer.into());
    self
  }

  /// Attempt timeout clipped to whatever is left before the deadline.
  fn attempt_timeout(&self) -> Duration {
    match self.deadline {
      Some(deadline) => self
        .timeout
        .min(deadline.saturating_duration_since(Instant::now())),
      None => self.timeout,
    }
  }

  /// Backoff delay shortened so a retry never sleeps past the deadline.
  fn clip_to_deadline(&self, delay: Duration) -> Duration {
    match self.deadline {
      Some(deadline) => delay.min(deadline.saturating_duration_since(Instant::now())),
      None => delay,
    }
  }

  fn past_deadline(&self) -> bool {
    self.deadline.is_some_and(|d| Instant::now() >= d)
  }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
  /// Final URL after redirects.
  pub url: String,
  pub status: u16,
  pub body: String,
  pub attempts: u32,
}

/// HTTP GET with browser-like headers, a per-attempt timeout, and bounded
/// retries with exponential backoff. 4xx answers are never retried.
#[derive(Clone)]
pub struct FetchClient {
  client: Client,
  config: HttpConfig,
}

impl FetchClient {
  pub fn new(config: &HttpConfig) -> AnyResult<Self> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(
      ACCEPT_LANGUAGE,
      HeaderValue::from_str(&config.accept_language)?,
    );

    let client = Client::builder()
      .user_agent(config.user_agent.clone())
      .default_headers(headers)
      .cookie_store(true)
      .connect_timeout(config.timeout())
      .tcp_nodelay(true)
      .pool_idle_timeout(Duration::from_secs(70))
      .build()?;

    Ok(Self {
      client,
      config: config.clone(),
    })
  }

  pub fn options(&self) -> FetchOptions {
    FetchOptions {
      timeout: self.config.timeout(),
      retries: self.config.retries,
      referer: None,
      deadline: None,
      cancel: CancellationToken::new(),
    }
  }

  pub async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<FetchResponse, FetchError> {
    let mut backoff = Backoff::new(
      opts.retries,
      self.config.backoff_base(),
      self.config.backoff_max(),
    );
    let mut attempts = 0u32;

    loop {
      attempts += 1;
      let err = match self.attempt(Method::GET, url, opts, opts.attempt_timeout()).await {
        Ok(exchange) => {
          debug!(
            url,
            status = exchange.status,
            attempts,
            bytes = exchange.body.len() as u64,
            "fetched"
          );
          return Ok(FetchResponse {
            url: exchange.url,
            status: exchange.status,
            body: exchange.body,
            attempts,
          });
        }
        Err(err) => err,
      };

      if err.is_terminal() {
        return Err(err);
      }
      if backoff.is_exhausted() || opts.past_deadline() {
        return Err(exhausted(url, attempts, err));
      }

      let delay = opts.clip_to_deadline(backoff.next());
      warn!(
        url,
        attempt = attempts,
        delay_ms = delay.as_millis() as u64,
        "fetch failed, retrying: {}",
        err
      );

      tokio::select! {
        _ = opts.cancel.cancelled() => {
          return Err(FetchError::Cancelled { url: url.to_string() });
        }
        _ = tokio::time::sleep(delay) => {}
      }
    }
  }

  /// HEAD reachability probe. Returns whether the target answered with a
  /// success status; never retried.
  pub async fn probe(&self, url: &str, opts: &FetchOptions) -> Result<bool, FetchError> {
    let timeout = opts.attempt_timeout().min(self.config.probe_timeout());
    match self.attempt(Method::HEAD, url, opts, timeout).await {
      Ok(exchange) => Ok((200..300).contains(&exchange.status)),
      Err(FetchError::Status { .. }) => Ok(false),
      Err(err) => Err(err),
    }
  }

  /// One request, headers and body, bounded by `timeout` and the cancel token.
  async fn attempt(
    &self,
    method: Method,
    url: &str,
    opts: &FetchOptions,
    timeout: Duration,
  ) -> Result<Exchange, FetchError> {
    if opts.cancel.is_cancelled() {
      return Err(FetchError::Cancelled {
        url: url.to_string(),
      });
    }
    if timeout.is_zero() {
      return Err(FetchError::Timeout {
        url: url.to_string(),
        timeout,
      });
    }

    let read_body = method != Method::HEAD;
    let mut request = self.client.request(method, url);
    if let Some(referer) = &opts.referer {
      request = request.header(REFERER, referer.as_str());
      if let Some(origin) = origin_of(referer) {
        request = request.header(ORIGIN, origin);
      }
    }

    let round_trip = exchange(request, url, timeout, read_body);

    tokio::select! {
      _ = opts.cancel.cancelled() => Err(FetchError::Cancelled { url: url.to_string() }),
      outcome = tokio::time::timeout(timeout, round_trip) => match outcome {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
          url: url.to_string(),
          timeout,
        }),
      },
    }
  }
}

struct Exchange {
  url: String,
  status: u16,
  body: String,
}

async fn exchange(
  request: RequestBuilder,
  url: &str,
  timeout: Duration,
  read_body: bool,
) -> Result<Exchange, FetchError> {
  let resp = request
    .send()
    .await
    .map_err(|source| transport_error(url, timeout, source))?;

  let status = resp.status();
  if status.is_client_error() || status.is_server_error() {
    return Err(FetchError::Status {
      url: url.to_string(),
      status: status.as_u16(),
    });
  }

  let final_url = resp.url().to_string();
  let body = if read_body {
    resp
      .text()
      .await
      .map_err(|source| transport_error(url, timeout, source))?
  } else {
    String::new()
  };

  Ok(Exchange {
    url: final_url,
    status: status.as_u16(),
    body,
  })
}

fn transport_error(url: &str, timeout: Duration, source: reqwest::Error) -> FetchError {
  if source.is_timeout() {
    FetchError::Timeout {
      url: url.to_string(),
      timeout,
    }
  } else {
    FetchError::Transport {
      url: url.to_string(),
      source,
    }
  }
}

fn exhausted(url: &str, attempts: u32, last: FetchError) -> FetchError {
  if attempts <= 1 {
    return last;
  }
  FetchError::Exhausted {
    url: url.to_string(),
    attempts,
    last: Box::new(last),
  }
}

fn origin_of(raw: &str) -> Option<String> {
  let parsed = url::Url::parse(raw).ok()?;
  match parsed.origin() {
    origin @ url::Origin::Tuple(..) => Some(origin.ascii_serialization()),
    url::Origin::Opaque(_) => None,
  }
}
