pub mod interpolate;

use interpolate::interpolate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{
  fs::read_to_string,
  path::{Path, PathBuf},
  time::Duration,
};
use tracing::warn;

pub use switchboard_cache::PersistedQueriesConfig;
pub use switchboard_logger::config::{LoggerConfig, LoggerConfigFormat};

/// This section describes the top-level configuration object of the gateway.
///
/// The gateway supports both YAML and JSON format for the configuration file.
///
/// ## Loading the config file
///
/// The configuration file path is the first argument of the binary:
///
/// ```sh
///
/// switchboard my-config-file.json
///
/// ```
///
/// > By default, the gateway looks for a file named `config.json` in the current directory.
///
/// ### Configuration Interpolation with Environment Variables
///
/// - Use `${VAR_NAME}` to insert the value of an environment variable.
/// - Specify a default value with `${VAR_NAME:-default_value}`, used when `VAR_NAME` is unset or empty.
/// - Fail loading with `${VAR_NAME:?message}` when `VAR_NAME` is unset or empty.
/// - Use `$$` for a literal dollar sign.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct GatewayConfig {
  #[serde(default)]
  /// Configuration for the HTTP server.
  pub server: ServerConfig,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  /// Logger configuration.
  pub logger: Option<LoggerConfig>,
  /// List of sources to be used by the gateway.
  pub sources: Vec<SourceDefinition>,
  /// List of GraphQL endpoints to be exposed by the gateway.
  /// Each endpoint exposes one source, with a unique set of plugins applied to it.
  pub endpoints: Vec<EndpointDefinition>,
  /// List of global plugins to be applied to all endpoints. Global plugins are applied before endpoint-specific plugins.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub plugins: Option<Vec<PluginDefinition>>,
  /// Automatic Persisted Queries, shared by all endpoints and transports.
  #[serde(default)]
  pub persisted_queries: PersistedQueriesConfig,
  /// Streaming transport (GraphQL over WebSocket).
  #[serde(default)]
  pub websocket: WebSocketConfig,
}

/// The `Endpoint` object exposes a GraphQL source with set of plugins applied to it.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct EndpointDefinition {
  /// A valid HTTP path to listen on for this endpoint. All transports share this path.
  pub path: String,
  /// The identifier of the `Source` to be used.
  ///
  /// This must match the `id` field of a `Source` definition.
  pub from: String,
  /// A list of unique plugins to be applied to this endpoint. These plugins will be applied after the global plugins.
  ///
  /// Order of plugins is important: plugins are applied in the order they are defined.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub plugins: Option<Vec<PluginDefinition>>,
}

fn default_plugin_enabled() -> Option<bool> {
  Some(true)
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(tag = "type")]
pub enum PluginDefinition {
  #[serde(rename = "cors")]
  CorsPlugin {
    #[serde(
      default = "default_plugin_enabled",
      skip_serializing_if = "Option::is_none"
    )]
    enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config: Option<cors_plugin::Config>,
  },

  #[serde(rename = "http_get")]
  HttpGetPlugin {
    #[serde(
      default = "default_plugin_enabled",
      skip_serializing_if = "Option::is_none"
    )]
    enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config: Option<http_get_plugin::Config>,
  },
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ServerConfig {
  /// Port to listen on. The `PORT` environment variable, when set, takes precedence.
  #[serde(default = "default_server_port")]
  pub port: u16,
  #[serde(default = "default_server_host")]
  pub host: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      port: default_server_port(),
      host: default_server_host(),
    }
  }
}

pub const PORT_ENV_VAR: &str = "PORT";

impl ServerConfig {
  /// Applies the `PORT` override. Invalid values are ignored with a warning.
  pub fn with_port_override(mut self, port: Option<String>) -> Self {
    if let Some(raw) = port {
      match raw.trim().parse::<u16>() {
        Ok(port) => self.port = port,
        Err(e) => warn!(
          "ignoring invalid {} value {:?}: {}, using port {}",
          PORT_ENV_VAR, raw, e, self.port
        ),
      }
    }

    self
  }
}

fn default_server_port() -> u16 {
  8080
}

fn default_server_host() -> String {
  "0.0.0.0".to_string()
}

/// Configuration of the streaming transport. Both `graphql-transport-ws` and the legacy
/// `graphql-ws` subprotocols are served on the endpoint path.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct WebSocketConfig {
  #[serde(default = "default_websocket_enabled")]
  pub enabled: bool,
  /// Origins allowed to open a streaming connection, matched exactly.
  ///
  /// Requests without an `Origin` header, or with an origin equal to the `Host` header, are always allowed.
  #[serde(default = "default_allowed_origins")]
  pub allowed_origins: Vec<String>,
  /// Interval between two heartbeats sent to the client.
  #[serde(with = "humantime_serde", default = "default_keep_alive_interval")]
  #[schemars(with = "String")]
  pub keep_alive_interval: Duration,
  /// Time to wait for the client to acknowledge a heartbeat before closing the connection.
  #[serde(with = "humantime_serde", default = "default_keep_alive_timeout")]
  #[schemars(with = "String")]
  pub keep_alive_timeout: Duration,
  /// Time to wait for `connection_init` after the upgrade.
  #[serde(
    with = "humantime_serde",
    default = "default_connection_init_wait_timeout"
  )]
  #[schemars(with = "String")]
  pub connection_init_wait_timeout: Duration,
}

impl Default for WebSocketConfig {
  fn default() -> Self {
    Self {
      enabled: default_websocket_enabled(),
      allowed_origins: default_allowed_origins(),
      keep_alive_interval: default_keep_alive_interval(),
      keep_alive_timeout: default_keep_alive_timeout(),
      connection_init_wait_timeout: default_connection_init_wait_timeout(),
    }
  }
}

fn default_websocket_enabled() -> bool {
  true
}

fn default_allowed_origins() -> Vec<String> {
  cors_plugin::DEV_ORIGINS
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_keep_alive_interval() -> Duration {
  Duration::from_secs(10)
}

fn default_keep_alive_timeout() -> Duration {
  Duration::from_secs(10)
}

fn default_connection_init_wait_timeout() -> Duration {
  Duration::from_secs(15)
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(tag = "type")]
pub enum SourceDefinition {
  #[serde(rename = "graphql")]
  GraphQL {
    id: String,
    config: GraphQLSourceConfig,
  },
  #[serde(rename = "mock")]
  Mock {
    id: String,
    config: MockedSourceConfig,
  },
}

impl SourceDefinition {
  pub fn id(&self) -> &str {
    match self {
      SourceDefinition::GraphQL { id, .. } => id,
      SourceDefinition::Mock { id, .. } => id,
    }
  }
}

/// An upstream GraphQL server, reached with HTTP `POST`.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct GraphQLSourceConfig {
  pub endpoint: String,
}

/// A source answering every operation with the same GraphQL response.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct MockedSourceConfig {
  pub response_data: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config file \"{path}\": {source}")]
  Read {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("unsupported config file extension for \"{0}\", expected .json, .yaml or .yml")]
  UnsupportedFormat(PathBuf),
  #[error("failed to interpolate config file: {}", .0.join(", "))]
  Interpolation(Vec<String>),
  #[error("failed to parse JSON config file: {0}")]
  Json(#[from] serde_json::Error),
  #[error("failed to parse YAML config file: {0}")]
  Yaml(#[from] serde_yaml::Error),
  #[error("endpoint \"{path}\" refers to unknown source \"{from}\"")]
  UnknownSource { path: String, from: String },
  #[error("endpoint path \"{0}\" is declared more than once")]
  DuplicateEndpoint(String),
}

pub fn load_config(
  file_path: impl AsRef<Path>,
  get_env_value: impl Fn(&str) -> Option<String>,
) -> Result<GatewayConfig, ConfigError> {
  let path = file_path.as_ref();
  let format = ConfigFormat::from_path(path)?;
  let raw_contents = read_to_string(path).map_err(|source| ConfigError::Read {
    path: path.to_path_buf(),
    source,
  })?;

  parse_config_contents(&raw_contents, format, get_env_value)
}

pub fn parse_config_contents(
  contents: &str,
  format: ConfigFormat,
  get_env_value: impl Fn(&str) -> Option<String>,
) -> Result<GatewayConfig, ConfigError> {
  let (config_string, warnings) =
    interpolate(contents, get_env_value).map_err(ConfigError::Interpolation)?;

  // The logger is not installed yet at this point.
  for warning in warnings {
    eprintln!("warning: {}", warning);
  }

  let config = match format {
    ConfigFormat::Json => serde_json::from_str::<GatewayConfig>(&config_string)?,
    ConfigFormat::Yaml => serde_yaml::from_str::<GatewayConfig>(&config_string)?,
  };

  config.validate()?;

  Ok(config)
}

impl GatewayConfig {
  fn validate(&self) -> Result<(), ConfigError> {
    let mut seen_paths = Vec::with_capacity(self.endpoints.len());

    for endpoint in &self.endpoints {
      if seen_paths.contains(&endpoint.path.as_str()) {
        return Err(ConfigError::DuplicateEndpoint(endpoint.path.clone()));
      }
      seen_paths.push(endpoint.path.as_str());

      if !self.sources.iter().any(|s| s.id() == endpoint.from) {
        return Err(ConfigError::UnknownSource {
          path: endpoint.path.clone(),
          from: endpoint.from.clone(),
        });
      }
    }

    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
  Json,
  Yaml,
}

impl ConfigFormat {
  pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
    match path.extension().and_then(|ext| ext.to_str()) {
      Some("json") => Ok(ConfigFormat::Json),
      Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
      _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn no_env(_: &str) -> Option<String> {
    None
  }

  const MINIMAL_YAML: &str = r#"
sources:
  - type: mock
    id: countries
    config:
      response_data:
        data:
          country:
            code: EE
endpoints:
  - path: /graphql
    from: countries
"#;

  #[test]
  fn defaults_are_applied() {
    let config = parse_config_contents(MINIMAL_YAML, ConfigFormat::Yaml, no_env).unwrap();

    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.host, "0.0.0.0");
    assert!(config.persisted_queries.enabled);
    assert_eq!(config.persisted_queries.max_entries, 100);
    assert!(config.websocket.enabled);
    assert_eq!(
      config.websocket.allowed_origins,
      vec!["http://localhost:8080", "http://localhost:8000"]
    );
    assert_eq!(config.websocket.keep_alive_interval, Duration::from_secs(10));
    assert_eq!(config.websocket.keep_alive_timeout, Duration::from_secs(10));
    assert_eq!(
      config.websocket.connection_init_wait_timeout,
      Duration::from_secs(15)
    );
  }

  #[test]
  fn full_json_config() {
    let contents = r#"{
      "server": { "port": 4000 },
      "logger": { "filter": "debug", "format": "compact" },
      "sources": [{ "type": "graphql", "id": "upstream", "config": { "endpoint": "${UPSTREAM:-http://localhost:4001/graphql}" } }],
      "endpoints": [{ "path": "/graphql", "from": "upstream", "plugins": [{ "type": "http_get", "config": { "mutations": true } }] }],
      "plugins": [{ "type": "cors", "config": { "allowed_origin": ["http://localhost:8000"] } }],
      "persisted_queries": { "max_entries": 2 },
      "websocket": { "allowed_origins": ["https://app.example"], "keep_alive_interval": "30s", "keep_alive_timeout": "500ms" }
    }"#;

    let config = parse_config_contents(contents, ConfigFormat::Json, no_env).unwrap();

    assert_eq!(config.server.port, 4000);
    assert_eq!(config.logger.unwrap().format, LoggerConfigFormat::Compact);
    assert!(matches!(
      &config.sources[0],
      SourceDefinition::GraphQL { config, .. } if config.endpoint == "http://localhost:4001/graphql"
    ));
    assert!(matches!(
      config.endpoints[0].plugins.as_deref(),
      Some([PluginDefinition::HttpGetPlugin { enabled: Some(true), config: Some(_) }])
    ));
    assert_eq!(config.persisted_queries.max_entries, 2);
    assert_eq!(config.websocket.allowed_origins, vec!["https://app.example"]);
    assert_eq!(config.websocket.keep_alive_interval, Duration::from_secs(30));
    assert_eq!(
      config.websocket.keep_alive_timeout,
      Duration::from_millis(500)
    );
  }

  #[test]
  fn endpoint_with_unknown_source() {
    let contents = MINIMAL_YAML.replace("from: countries", "from: nope");
    let result = parse_config_contents(&contents, ConfigFormat::Yaml, no_env);

    assert!(matches!(result, Err(ConfigError::UnknownSource { .. })));
  }

  #[test]
  fn failed_interpolation() {
    let contents = MINIMAL_YAML.replace("code: EE", "code: ${CODE:?missing country code}");
    let result = parse_config_contents(&contents, ConfigFormat::Yaml, no_env);

    assert!(matches!(result, Err(ConfigError::Interpolation(_))));
  }

  #[test]
  fn port_override() {
    let server = ServerConfig::default();

    assert_eq!(server.clone().with_port_override(None).port, 8080);
    assert_eq!(
      server.clone().with_port_override(Some("3000".into())).port,
      3000
    );
    assert_eq!(
      server.with_port_override(Some("not-a-port".into())).port,
      8080
    );
  }

  #[test]
  fn loads_from_file_by_extension() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(MINIMAL_YAML.as_bytes()).unwrap();

    let config = load_config(file.path(), no_env).unwrap();
    assert_eq!(config.endpoints[0].path, "/graphql");

    let unsupported = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    assert!(matches!(
      load_config(unsupported.path(), no_env),
      Err(ConfigError::UnsupportedFormat(_))
    ));
  }
}
