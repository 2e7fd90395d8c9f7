use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Configuration for Automatic Persisted Queries.
///
/// Full query texts are kept in memory, keyed by their SHA-256 hash, using an LRU
/// (Least Recently Used) eviction policy. The store is empty when the gateway starts.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct PersistedQueriesConfig {
  /// Enables resolution of the `persistedQuery` extension.
  #[serde(default = "default_enabled")]
  pub enabled: bool,

  /// The maximum number of cached query texts. Default is 100 entries.
  /// When the cache reaches this size, the least recently used entry is evicted.
  #[serde(default = "default_max_entries")]
  pub max_entries: usize,
}

impl Default for PersistedQueriesConfig {
  fn default() -> Self {
    Self {
      enabled: default_enabled(),
      max_entries: default_max_entries(),
    }
  }
}

fn default_enabled() -> bool {
  true
}

pub const DEFAULT_MAX_ENTRIES: usize = 100;

fn default_max_entries() -> usize {
  DEFAULT_MAX_ENTRIES
}
