use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod fields;
pub mod formatter;
pub mod store;

pub use fields::*;
pub use formatter::*;
pub use store::*;

use crate::configs::{Config, LoggingConfig};

pub(crate) static GLOBAL_LOG_STORE: OnceLock<LogStore> = OnceLock::new();

/// The store installed by [`init`], if logging has been initialised.
pub fn log_store() -> Option<&'static LogStore> {
  GLOBAL_LOG_STORE.get()
}

fn filter_string(logging: Option<&LoggingConfig>) -> String {
  let log_level = logging.and_then(|l| l.level.as_deref()).unwrap_or("info");
  let filters = logging.and_then(|l| l.filters.as_deref()).unwrap_or("");

  if filters.is_empty() {
    format!("{},hyper=warn,reqwest=warn", log_level)
  } else {
    format!("{},hyper=warn,reqwest=warn,{}", log_level, filters)
  }
}

/// Installs the console formatter and the correlated in-memory store.
///
/// `RUST_LOG` overrides the configured level. Calling this twice keeps the
/// first subscriber and returns the store that was installed with it.
pub fn init(config: &Config) -> LogStore {
  let logging = config.logging.as_ref();
  let env_filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(filter_string(logging)));

  let use_ansi = logging.and_then(|l| l.ansi).unwrap_or(true);
  let stdout_layer = fmt::layer()
    .with_writer(std::io::stderr)
    .event_format(CustomFormatter::new(use_ansi))
    .with_ansi(use_ansi);

  let store = GLOBAL_LOG_STORE
    .get_or_init(|| {
      let retain = logging.map(LoggingConfig::retain).unwrap_or(2_000);
      let steps = logging.is_some_and(|l| l.steps);
      LogStore::new(retain, steps)
    })
    .clone();

  if tracing_subscriber::registry()
    .with(env_filter)
    .with(stdout_layer)
    .with(store.clone())
    .try_init()
    .is_err()
  {
    tracing::debug!("tracing subscriber already installed");
  }

  store
}
