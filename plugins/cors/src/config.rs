use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Development origins allowed when nothing else is configured.
pub const DEV_ORIGINS: [&str; 2] = ["http://localhost:8080", "http://localhost:8000"];

/// The `cors` plugin applies [Cross-Origin Resource Sharing (CORS)](https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS) headers
/// to every request/response exchange of the endpoint, and answers preflight requests.
///
/// Streaming connections are not covered by this plugin: their upgrade is gated by the
/// `websocket.allowed_origins` list instead.
///
/// The plugin is active on every endpoint unless it is declared with `enabled: false`. By default
/// only [`DEV_ORIGINS`] are allowed, with credentials.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct CorsPluginConfig {
  /// `Access-Control-Allow-Credentials`: whether the response can be exposed when the request was sent with credentials
  /// (cookies, authorization headers or TLS client certificates).
  #[serde(
    default = "default_allow_credentials",
    skip_serializing_if = "Option::is_none"
  )]
  pub allow_credentials: Option<bool>,

  /// `Access-Control-Allow-Methods`: the methods allowed in response to a preflight request. `*` allows any method.
  #[serde(default = "default_wildcard", skip_serializing_if = "Option::is_none")]
  pub allowed_methods: Option<String>,

  /// `Access-Control-Allow-Origin`: `*` for any origin, `reflect` to echo the request origin,
  /// a single origin, or a list of origins. With a list, the request origin is echoed only when it is part of the list.
  #[serde(
    default = "default_allowed_origin",
    skip_serializing_if = "Option::is_none"
  )]
  pub allowed_origin: Option<AllowedOrigin>,

  /// `Access-Control-Allow-Headers`: the headers allowed in the actual request. `*` echoes `Access-Control-Request-Headers`.
  #[serde(default = "default_wildcard", skip_serializing_if = "Option::is_none")]
  pub allowed_headers: Option<String>,

  /// `Access-Control-Expose-Headers`: response headers made available to scripts running in the browser.
  #[serde(default = "default_wildcard", skip_serializing_if = "Option::is_none")]
  pub exposed_headers: Option<String>,

  /// `Access-Control-Max-Age`: how long, in seconds, the result of a preflight request can be cached.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_age: Option<u64>,
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum AllowedOrigin {
  Single(String),
  List(Vec<String>),
}

impl Default for CorsPluginConfig {
  fn default() -> Self {
    Self {
      allow_credentials: default_allow_credentials(),
      allowed_methods: default_wildcard(),
      allowed_origin: default_allowed_origin(),
      allowed_headers: default_wildcard(),
      exposed_headers: default_wildcard(),
      max_age: None,
    }
  }
}

fn default_wildcard() -> Option<String> {
  Some("*".to_string())
}

fn default_allowed_origin() -> Option<AllowedOrigin> {
  Some(AllowedOrigin::List(
    DEV_ORIGINS.iter().map(ToString::to_string).collect(),
  ))
}

fn default_allow_credentials() -> Option<bool> {
  Some(true)
}
