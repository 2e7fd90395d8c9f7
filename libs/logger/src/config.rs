use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Logger configuration of the gateway process.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct LoggerConfig {
  /// Log filter, using the `RUST_LOG` directives syntax (e.g. `info,switchboard_engine=debug`).
  #[serde(default = "default_log_filter")]
  pub filter: String,
  /// Output format of log records.
  #[serde(default)]
  pub format: LoggerConfigFormat,
  /// Emit an event when a span closes, including its busy/idle timings.
  #[serde(default)]
  pub print_performance_info: bool,
}

impl Default for LoggerConfig {
  fn default() -> Self {
    Self {
      filter: default_log_filter(),
      format: LoggerConfigFormat::default(),
      print_performance_info: false,
    }
  }
}

fn default_log_filter() -> String {
  "info".to_string()
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema, PartialEq)]
pub enum LoggerConfigFormat {
  /// Minimal, single-line records with the message and its fields.
  #[serde(rename = "compact")]
  #[schemars(title = "compact")]
  Compact,

  /// Multi-line records with source locations, for local development.
  #[serde(rename = "pretty")]
  #[schemars(title = "pretty")]
  Pretty,

  /// One JSON object per record, for log aggregators.
  #[serde(rename = "json")]
  #[schemars(title = "json")]
  Json,
}

impl Default for LoggerConfigFormat {
  // In development, we wish to see some more details and code locations.
  #[cfg(debug_assertions)]
  fn default() -> Self {
    LoggerConfigFormat::Pretty
  }

  #[cfg(not(debug_assertions))]
  fn default() -> Self {
    if atty::is(atty::Stream::Stdout) {
      LoggerConfigFormat::Compact
    } else {
      LoggerConfigFormat::Json
    }
  }
}
