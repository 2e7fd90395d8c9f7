use std::sync::Arc;

use switchboard_cache::PersistedQueryCache;
use switchboard_common::{
  execute::RequestExecutionContext,
  graphql::{GraphQLRequest, GraphQLResponse, ParsedGraphQLRequest},
  http::{extract_accept, header, GatewayHttpRequest, GatewayHttpResponse, HeaderValue, StatusCode},
  origin::RequestOrigin,
  plugin::PluginError,
};
use switchboard_config::{GatewayConfig, SourceDefinition};
use tracing::{debug, error, warn};

use crate::{
  persisted_queries::PersistedQueryResolver,
  plugin_manager::PluginManager,
  source::{
    graphql_source::GraphQLSourceRuntime, mock_source::MockedSourceRuntime,
    runtime::SourceRuntime,
  },
  transport::TransportKind,
  ws::{connection::StreamingSettings, protocol::WsProtocol, StreamingConnection},
};

pub const ALLOWED_METHODS: &str = "OPTIONS, GET, POST";
pub const WEBSOCKET_PROTOCOL_HEADER: &str = "sec-websocket-protocol";

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
  #[error("failed to create plugins for endpoint \"{path}\": {source}")]
  PluginManagerInitError { path: String, source: PluginError },
  #[error("endpoint \"{path}\" uses unknown source \"{from}\"")]
  MissingSource { path: String, from: String },
}

/// Everything an endpoint needs to serve a request, shared by all connections on its path.
#[derive(Debug)]
pub struct GatewayRouteData {
  pub plugin_manager: PluginManager,
  pub source: Arc<dyn SourceRuntime>,
  pub persisted_queries: Option<PersistedQueryResolver>,
  pub streaming: Option<StreamingSettings>,
}

impl GatewayRouteData {
  pub fn new(plugin_manager: PluginManager, source: Arc<dyn SourceRuntime>) -> Self {
    Self {
      plugin_manager,
      source,
      persisted_queries: None,
      streaming: None,
    }
  }

  pub fn with_persisted_queries(mut self, cache: Arc<PersistedQueryCache>) -> Self {
    self.persisted_queries = Some(PersistedQueryResolver::new(cache));
    self
  }

  pub fn with_streaming(mut self, settings: StreamingSettings) -> Self {
    self.streaming = Some(settings);
    self
  }
}

#[derive(Debug, Clone)]
pub struct GatewayRoute {
  pub base_path: String,
  pub route_data: Arc<GatewayRouteData>,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeRejection {
  #[error("streaming transport is disabled")]
  StreamingDisabled,
  #[error("origin is not allowed to open a streaming connection")]
  OriginNotAllowed,
}

impl UpgradeRejection {
  pub fn status_code(&self) -> StatusCode {
    match self {
      UpgradeRejection::StreamingDisabled => StatusCode::BAD_REQUEST,
      UpgradeRejection::OriginNotAllowed => StatusCode::FORBIDDEN,
    }
  }

  pub fn into_response(self) -> GatewayHttpResponse {
    GraphQLResponse::new_error(&self.to_string()).into_with_status_code(self.status_code())
  }
}

#[derive(Debug)]
pub struct Gateway {
  pub routes: Vec<GatewayRoute>,
  pub persisted_queries: Option<Arc<PersistedQueryCache>>,
}

impl Gateway {
  /// Builds one route per endpoint. All routes share the same persisted query cache.
  pub async fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
    let persisted_queries = config
      .persisted_queries
      .enabled
      .then(|| Arc::new(PersistedQueryCache::new(config.persisted_queries.max_entries)));
    let streaming = config
      .websocket
      .enabled
      .then(|| StreamingSettings::from(&config.websocket));

    let mut routes = Vec::with_capacity(config.endpoints.len());

    for endpoint_config in config.endpoints.iter() {
      let combined_plugins = config
        .plugins
        .iter()
        .chain(&endpoint_config.plugins)
        .flat_map(|vec| vec.iter())
        .cloned()
        .collect::<Vec<_>>();

      let plugin_manager = PluginManager::new(&combined_plugins).await.map_err(|source| {
        GatewayError::PluginManagerInitError {
          path: endpoint_config.path.clone(),
          source,
        }
      })?;

      let source = config
        .sources
        .iter()
        .find(|source_def| source_def.id() == endpoint_config.from)
        .map(create_source)
        .ok_or_else(|| GatewayError::MissingSource {
          path: endpoint_config.path.clone(),
          from: endpoint_config.from.clone(),
        })?;

      let mut route_data = GatewayRouteData::new(plugin_manager, source);

      if let Some(cache) = &persisted_queries {
        route_data = route_data.with_persisted_queries(cache.clone());
      }

      if let Some(settings) = &streaming {
        route_data = route_data.with_streaming(settings.clone());
      }

      debug!(
        "endpoint {} -> source {}",
        endpoint_config.path, endpoint_config.from
      );

      routes.push(GatewayRoute {
        base_path: endpoint_config.path.clone(),
        route_data: Arc::new(route_data),
      });
    }

    Ok(Self {
      routes,
      persisted_queries,
    })
  }

  /// Gates a streaming upgrade. Nothing of the connection exists before this succeeds.
  #[tracing::instrument(level = "debug", skip_all, name = "Gateway::authorize_upgrade")]
  pub fn authorize_upgrade(
    request: &GatewayHttpRequest,
    route_data: &GatewayRouteData,
  ) -> Result<StreamingConnection, UpgradeRejection> {
    let settings = route_data
      .streaming
      .as_ref()
      .ok_or(UpgradeRejection::StreamingDisabled)?;

    let origin = RequestOrigin::from_headers(&request.headers);

    if !settings.allowed_origins.allows(&origin) {
      warn!(
        "refusing streaming upgrade from origin {:?} (host {:?})",
        origin.origin, origin.host
      );

      return Err(UpgradeRejection::OriginNotAllowed);
    }

    let protocol = WsProtocol::negotiate(request.header(WEBSOCKET_PROTOCOL_HEADER));
    debug!("streaming upgrade accepted, protocol {}", protocol.name());

    Ok(StreamingConnection::new(
      protocol,
      route_data.source.clone(),
      route_data.persisted_queries.clone(),
      settings.clone(),
    ))
  }

  #[cfg(feature = "test_utils")]
  pub async fn execute_test(
    source: Arc<dyn SourceRuntime>,
    plugins: Vec<Box<dyn switchboard_common::plugin::Plugin>>,
    request: GatewayHttpRequest,
  ) -> GatewayHttpResponse {
    let route_data = GatewayRouteData::new(PluginManager::new_from_vec(plugins), source);

    Self::execute(request, &route_data).await
  }

  #[tracing::instrument(skip(request, route_data), name = "Gateway::execute")]
  pub async fn execute(
    request: GatewayHttpRequest,
    route_data: &GatewayRouteData,
  ) -> GatewayHttpResponse {
    let transport = TransportKind::detect(&request);
    let mut request_ctx = RequestExecutionContext::new(request);

    // Step 1: Trigger "on_downstream_http_request" on all plugins
    route_data
      .plugin_manager
      .on_downstream_http_request(&mut request_ctx)
      .await;

    // Step 1.5: In case of short circuit, return the response right now.
    if let Some(response) = request_ctx.take_short_circuit() {
      return finalize(route_data, &mut request_ctx, response);
    }

    // Step 2: Transport specific handling. GET is extracted by the http_get plugin,
    // POST is handled here unless a plugin already extracted the operation.
    match transport {
      TransportKind::Options => {
        let mut response = GatewayHttpResponse::empty(StatusCode::OK);
        response
          .headers
          .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));

        return finalize(route_data, &mut request_ctx, response);
      }
      TransportKind::Unsupported | TransportKind::Streaming => {
        let mut response = GraphQLResponse::new_error("unsupported HTTP method")
          .into_with_status_code(StatusCode::METHOD_NOT_ALLOWED);
        response
          .headers
          .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));

        return finalize(route_data, &mut request_ctx, response);
      }
      TransportKind::HttpPost if !request_ctx.has_extracted_request() => {
        debug!("captured POST request, trying to handle as GraphQL POST flow");
        let (_, accept, result) =
          GraphQLRequest::new_from_http_post(&request_ctx.downstream_http_request);

        match result {
          Ok(gql_request) => request_ctx.extracted_graphql_request = Some(gql_request),
          Err(e) => {
            error!(
              "error while trying to extract GraphQL request from POST request: {:?}",
              e
            );
            let response = e.into_response(accept);

            return finalize(route_data, &mut request_ctx, response);
          }
        }
      }
      TransportKind::HttpGet | TransportKind::HttpPost => {}
    }

    // Step 2.5: In case of invalid request at this point, we can fail and return an error.
    let mut gql_request = match request_ctx.extracted_graphql_request.take() {
      Some(gql_request) => gql_request,
      None => {
        let response = GraphQLResponse::new_error("failed to extract GraphQL request from HTTP request")
          .into_with_status_code(StatusCode::BAD_REQUEST);

        return finalize(route_data, &mut request_ctx, response);
      }
    };

    // Step 3: Resolve persisted queries, the same way for every transport.
    if let Some(resolver) = &route_data.persisted_queries {
      if let Err(e) = resolver.resolve(&mut gql_request) {
        debug!("persisted query rejected: {}", e);

        return finalize(route_data, &mut request_ctx, e.into_response());
      }
    }

    // Step 4: Parse the operation.
    match ParsedGraphQLRequest::create_and_parse(gql_request) {
      Ok(parsed) => request_ctx.downstream_graphql_request = Some(parsed),
      Err(e) => {
        let accept = extract_accept(&request_ctx.downstream_http_request.headers);
        let response = e.into_response(accept);

        return finalize(route_data, &mut request_ctx, response);
      }
    }

    // Step 5: Execute plugins on the extracted GraphQL request.
    route_data
      .plugin_manager
      .on_downstream_graphql_request(&mut request_ctx)
      .await;

    // Step 5.5: In case of short circuit, return the response right now.
    if let Some(response) = request_ctx.take_short_circuit() {
      return finalize(route_data, &mut request_ctx, response);
    }

    let mut parsed = match request_ctx.downstream_graphql_request.take() {
      Some(parsed) => parsed,
      None => {
        let response = GraphQLResponse::new_error("GraphQL request was dropped by a plugin")
          .into_with_status_code(StatusCode::INTERNAL_SERVER_ERROR);

        return finalize(route_data, &mut request_ctx, response);
      }
    };

    // Step 6: Last chance for plugins to change what is sent to the source.
    route_data
      .plugin_manager
      .on_upstream_graphql_request(&mut parsed.request)
      .await;

    // Step 7: Execute, source errors end up in the response envelope.
    let upstream_response = route_data
      .source
      .execute(&parsed)
      .await
      .unwrap_or_else(|e| {
        error!("source failed to execute operation: {}", e);

        e.into()
      });

    request_ctx.downstream_graphql_request = Some(parsed);

    finalize(route_data, &mut request_ctx, upstream_response.into())
  }
}

fn finalize(
  route_data: &GatewayRouteData,
  request_ctx: &mut RequestExecutionContext,
  mut response: GatewayHttpResponse,
) -> GatewayHttpResponse {
  route_data
    .plugin_manager
    .on_downstream_http_response(request_ctx, &mut response);

  response
}

fn create_source(source_def: &SourceDefinition) -> Arc<dyn SourceRuntime> {
  match source_def {
    SourceDefinition::GraphQL { config, .. } => Arc::new(GraphQLSourceRuntime::new(config.clone())),
    SourceDefinition::Mock { config, .. } => Arc::new(MockedSourceRuntime::new(config.clone())),
  }
}
