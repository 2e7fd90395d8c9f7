use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The `http_get` plugin exposes the endpoint over HTTP `GET` requests, using query parameters:
///
/// `GET /graphql?query=query%20%7B%20__typename%20%7D`
///
/// - `query`: the GraphQL operation. Can be omitted when `extensions` carries a persisted query hash.
///
/// - `variables` (optional): a JSON-encoded object with the operation variables
///
/// - `operationName` (optional): the name of the operation to execute
///
/// - `extensions` (optional): a JSON-encoded object, e.g. `{"persistedQuery":{"version":1,"sha256Hash":"..."}}`
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct HttpGetPluginConfig {
  /// Allow mutations over GET requests.
  ///
  /// **The option is disabled by default:** GET is a safe method and must not change state.
  #[serde(
    default = "mutations_default_value",
    skip_serializing_if = "Option::is_none"
  )]
  pub mutations: Option<bool>,
}

impl HttpGetPluginConfig {
  pub fn allows_mutations(&self) -> bool {
    self.mutations == Some(true)
  }
}

fn mutations_default_value() -> Option<bool> {
  Some(false)
}
