use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{common::errors::ConfigError, configs::*};

const CONFIG_CANDIDATES: [&str; 2] = ["streamrelay.toml", "streamrelay.default.toml"];

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
  #[serde(default)]
  pub http: HttpConfig,
  pub logging: Option<LoggingConfig>,
  #[serde(default)]
  pub extraction: ExtractionConfig,
  /// Placeholder token (without braces) to concrete CDN domain.
  #[serde(default)]
  pub placeholders: HashMap<String, String>,
  #[serde(default)]
  pub providers: Vec<ProviderConfig>,
}

impl Config {
  pub fn load() -> Result<Self, ConfigError> {
    let config_path = CONFIG_CANDIDATES
      .iter()
      .find(|p| Path::new(p).exists())
      .ok_or_else(|| ConfigError::Read {
        path: CONFIG_CANDIDATES.join(" or "),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
      })?;

    Self::from_path(config_path)
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.display().to_string(),
      source,
    })?;
    if config_str.trim().is_empty() {
      return Err(ConfigError::Empty(path.display().to_string()));
    }

    Self::from_toml(&config_str)
  }

  pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
    Ok(toml::from_str(raw)?)
  }

  pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
    self.providers
      .iter()
      .find(|p| p.enabled && p.name.eq_ignore_ascii_case(name))
  }
}
