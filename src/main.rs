use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use streamrelay::{
  CallOptions, Config, ExtractionOutcome, ExtractionRequest, SourceManager, common::logger,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "streamrelay")]
#[command(about = "Resolve a content id to a playable HLS stream URL")]
#[command(version)]
struct Cli {
  /// Content id as used by the providers' entry pages (e.g. "tt0133093")
  content_id: String,

  /// Season number, makes this an episode request
  #[arg(long, requires = "episode")]
  season: Option<u32>,

  /// Episode number, makes this an episode request
  #[arg(long, requires = "season")]
  episode: Option<u32>,

  /// Config file (defaults to streamrelay.toml, then streamrelay.default.toml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Only run this provider
  #[arg(short, long, conflicts_with = "race")]
  provider: Option<String>,

  /// Run every provider at once and keep the first success
  #[arg(long)]
  race: bool,

  /// Per-request fetch timeout in milliseconds
  #[arg(long)]
  timeout_ms: Option<u64>,

  /// Retries per fetch
  #[arg(long)]
  retries: Option<u32>,

  /// Budget for the whole call in milliseconds
  #[arg(long)]
  budget_ms: Option<u64>,

  /// Referer sent on every fetch
  #[arg(long)]
  referer: Option<String>,

  /// Probe the resolved URL with a HEAD request
  #[arg(long)]
  check_availability: bool,

  /// Print pattern and decoder statistics to stderr when done
  #[arg(long)]
  stats: bool,
}

impl Cli {
  fn request(&self) -> ExtractionRequest {
    match (self.season, self.episode) {
      (Some(season), Some(episode)) => {
        ExtractionRequest::episode(self.content_id.as_str(), season, episode)
      }
      _ => ExtractionRequest::movie(self.content_id.as_str()),
    }
  }

  fn options(&self, cancel: CancellationToken) -> CallOptions {
    let mut options = CallOptions::default().cancel(cancel);
    if let Some(ms) = self.timeout_ms {
      options = options.timeout(Duration::from_millis(ms));
    }
    if let Some(retries) = self.retries {
      options = options.retries(retries);
    }
    if let Some(ms) = self.budget_ms {
      options = options.deadline(Duration::from_millis(ms));
    }
    if let Some(referer) = &self.referer {
      options = options.referer(referer.clone());
    }
    if self.check_availability {
      options = options.check_availability(true);
    }
    options
  }
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();

  let loaded = match &cli.config {
    Some(path) => Config::from_path(path),
    None => Config::load(),
  };
  let config = match loaded {
    Ok(config) => config,
    Err(e) => {
      eprintln!("Error: {}", e);
      return ExitCode::from(2);
    }
  };

  logger::init(&config);

  let manager = match SourceManager::new(&config) {
    Ok(manager) => manager,
    Err(e) => {
      eprintln!("Error: {}", e);
      return ExitCode::from(2);
    }
  };

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupted, cancelling extraction");
      on_interrupt.cancel();
    }
  });

  let request = cli.request();
  let options = cli.options(cancel);
  info!("Resolving {} with {} provider(s)", request, manager.providers().len());

  let outcome = match (&cli.provider, cli.race) {
    (Some(provider), _) => manager.extract_with(provider, &request, options).await,
    (None, true) => manager.extract_racing(&request, options).await,
    (None, false) => manager.extract(&request, options).await,
  };

  if cli.stats {
    for (key, stats) in manager.pattern_stats() {
      eprintln!("pattern {}: {}/{}", key, stats.successes, stats.attempts);
    }
    for (name, stats) in manager.decoder_stats() {
      if stats.attempts > 0 {
        eprintln!("decoder {}: {}/{}", name, stats.successes, stats.attempts);
      }
    }
  }

  match serde_json::to_string_pretty(&outcome) {
    Ok(json) => println!("{}", json),
    Err(e) => {
      eprintln!("Error: {}", e);
      return ExitCode::from(1);
    }
  }

  match outcome {
    ExtractionOutcome::Succeeded(_) => ExitCode::SUCCESS,
    ExtractionOutcome::Failed(_) => ExitCode::from(1),
  }
}
