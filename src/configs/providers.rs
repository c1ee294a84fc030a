use serde::{Deserialize, Serialize};

/// A site-specific recognition rule supplied through configuration.
///
/// Exactly one of `regex` or `selector` is set. A regex must expose the
/// captured value either as a group named `value` or as group 1, and
/// hidden-payload rules may add a group named `id` for the container id.
/// A selector yields the matched element's `attr` when given, otherwise
/// its inner HTML, with the element's `id` as container.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct PatternConfig {
  pub name: String,
  pub regex: Option<String>,
  pub selector: Option<String>,
  pub attr: Option<String>,
  /// Path segment used when a relay capture is a bare path.
  pub prefix: Option<String>,
}

/// One relay site: how to build its entry URL and where its relay pages live.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
  pub name: String,
  /// Label shown next to the site's hash on the entry page.
  pub display_name: Option<String>,
  #[serde(default = "default_enabled")]
  pub enabled: bool,
  #[serde(default)]
  pub priority: u32,
  /// Entry URL template, `{id}` is substituted.
  pub entry_movie: String,
  /// Entry URL template, `{id}`, `{season}` and `{episode}` are substituted.
  pub entry_episode: String,
  /// Relay URL template, `{hash}` is substituted.
  pub relay_url: String,
  /// Origin that relative secondary-relay paths are joined onto.
  pub secondary_base: String,
  pub timeout_ms: Option<u64>,
  pub retries: Option<u32>,
  #[serde(default)]
  pub hash_patterns: Vec<PatternConfig>,
  #[serde(default)]
  pub relay_patterns: Vec<PatternConfig>,
  #[serde(default)]
  pub payload_patterns: Vec<PatternConfig>,
}

fn default_enabled() -> bool {
  true
}

impl ProviderConfig {
  pub fn display_name(&self) -> &str {
    self.display_name.as_deref().unwrap_or(&self.name)
  }
}
