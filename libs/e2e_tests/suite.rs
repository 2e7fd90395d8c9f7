use std::{sync::Arc, time::Duration};

use httpmock::{prelude::*, Then, When};
use serde_json::json;
use switchboard_cache::PersistedQueryCache;
use switchboard_common::{
  graphql::{GraphQLRequest, APPLICATION_GRAPHQL_JSON},
  http::{
    GatewayHttpRequest, GatewayHttpResponse, HttpHeadersMap, Method, ACCEPT, CONTENT_TYPE,
  },
  origin::OriginAllowList,
  plugin::{CreatablePlugin, Plugin},
};
use switchboard_config::GraphQLSourceConfig;
use switchboard_engine::{
  gateway::{Gateway, GatewayRouteData},
  plugin_manager::PluginManager,
  source::{graphql_source::GraphQLSourceRuntime, runtime::SourceRuntime},
  ws::StreamingSettings,
};

use crate::sources::EchoSource;

pub const DEV_ORIGINS: [&str; 2] = ["http://localhost:8080", "http://localhost:8000"];

pub struct TestSuite {
  pub plugins: Vec<Box<dyn Plugin>>,
  pub source: Arc<dyn SourceRuntime>,
  pub persisted_queries: Option<Arc<PersistedQueryCache>>,
  pub streaming: Option<StreamingSettings>,
}

impl Default for TestSuite {
  fn default() -> Self {
    Self {
      plugins: vec![],
      source: Arc::new(EchoSource),
      persisted_queries: Some(Arc::new(PersistedQueryCache::default())),
      streaming: Some(streaming_settings()),
    }
  }
}

/// Development defaults, with a keep-alive long enough to stay out of the way.
pub fn streaming_settings() -> StreamingSettings {
  StreamingSettings {
    allowed_origins: OriginAllowList::new(DEV_ORIGINS),
    keep_alive_interval: Duration::from_secs(600),
    keep_alive_timeout: Duration::from_secs(10),
    connection_init_wait_timeout: Duration::from_secs(15),
  }
}

pub async fn create_plugin<T: CreatablePlugin + 'static>(config: T::Config) -> Box<dyn Plugin> {
  PluginManager::create_plugin::<T>(config).await.unwrap()
}

pub fn post_request(request: &GraphQLRequest) -> GatewayHttpRequest {
  let mut headers = HttpHeadersMap::new();
  headers.append(CONTENT_TYPE, "application/json".parse().unwrap());

  GatewayHttpRequest {
    method: Method::POST,
    query_string: "".to_string(),
    uri: "/graphql".to_string(),
    body: serde_json::to_vec(request).unwrap().into(),
    headers,
  }
}

/// Same request, asking for the `application/graphql-response+json` media type.
pub fn with_graphql_accept(mut request: GatewayHttpRequest) -> GatewayHttpRequest {
  request.headers.insert(
    ACCEPT,
    APPLICATION_GRAPHQL_JSON.parse().unwrap(),
  );

  request
}

/// Encodes GET parameters the way browsers do.
pub fn query_string(params: &[(&str, &str)]) -> String {
  url::form_urlencoded::Serializer::new(String::new())
    .extend_pairs(params)
    .finish()
}

pub fn get_request(query_string: &str) -> GatewayHttpRequest {
  GatewayHttpRequest {
    method: Method::GET,
    query_string: query_string.to_string(),
    uri: format!("/graphql?{}", query_string),
    body: Default::default(),
    headers: HttpHeadersMap::new(),
  }
}

impl TestSuite {
  pub fn with_source(source: impl SourceRuntime) -> Self {
    Self {
      source: Arc::new(source),
      ..Default::default()
    }
  }

  pub fn into_route_data(self) -> GatewayRouteData {
    let mut route_data =
      GatewayRouteData::new(PluginManager::new_from_vec(self.plugins), self.source);
    route_data.persisted_queries = self
      .persisted_queries
      .map(switchboard_engine::persisted_queries::PersistedQueryResolver::new);
    route_data.streaming = self.streaming;

    route_data
  }

  pub async fn run_http_request(self, request: GatewayHttpRequest) -> GatewayHttpResponse {
    Gateway::execute(request, &self.into_route_data()).await
  }

  pub async fn run_graphql_request(self, request: GraphQLRequest) -> GatewayHttpResponse {
    self.run_http_request(post_request(&request)).await
  }

  /// Runs the request against an upstream GraphQL server mocked with `mock_fn`.
  pub async fn run_with_mock(
    self,
    request: GatewayHttpRequest,
    mock_fn: impl FnOnce(When, Then),
  ) -> GatewayHttpResponse {
    let mock_server = MockServer::start_async().await;
    let mock = mock_server.mock_async(mock_fn).await;

    let source = GraphQLSourceRuntime::new(GraphQLSourceConfig {
      endpoint: mock_server.url("/graphql"),
    });

    let response = Gateway::execute_test(Arc::new(source), self.plugins, request).await;

    mock.assert_async().await;
    response
  }
}

pub fn typename_response() -> serde_json::Value {
  json!({ "data": { "__typename": "Query" } })
}
