use crate::config::HttpGetPluginConfig;

use switchboard_common::execute::RequestExecutionContext;
use switchboard_common::{
  graphql::{ExtractGraphQLOperationError, GraphQLRequest, GraphQLResponse},
  http::{extract_accept, parse_query_string, GatewayHttpRequest, Method, Mime, StatusCode},
  json::parse_json_object,
};
use tracing::debug;

use switchboard_common::plugin::{CreatablePlugin, Plugin, PluginError};

#[derive(Debug)]
pub struct HttpGetPlugin(HttpGetPluginConfig);

#[async_trait::async_trait]
impl CreatablePlugin for HttpGetPlugin {
  type Config = HttpGetPluginConfig;

  async fn create(config: Self::Config) -> Result<Box<Self>, PluginError> {
    Ok(Box::new(Self(config)))
  }
}

#[async_trait::async_trait]
impl Plugin for HttpGetPlugin {
  async fn on_downstream_http_request(&self, ctx: &mut RequestExecutionContext) {
    if ctx.downstream_http_request.method != Method::GET || ctx.has_extracted_request() {
      return;
    }

    let (accept, result) = extract_graphql_from_get_request(&ctx.downstream_http_request);

    match result {
      Ok(gql_request) => {
        debug!("extracted GraphQL request from GET query parameters");
        ctx.extracted_graphql_request = Some(gql_request);
      }
      Err(ExtractGraphQLOperationError::EmptyExtraction) => {
        // nothing to do here, the dispatcher answers requests without an operation
      }
      Err(e) => {
        ctx.short_circuit(e.into_response(accept));
      }
    }
  }

  async fn on_downstream_graphql_request(&self, ctx: &mut RequestExecutionContext) {
    if ctx.downstream_http_request.method != Method::GET || self.0.allows_mutations() {
      return;
    }

    let is_mutation = ctx
      .downstream_graphql_request
      .as_ref()
      .is_some_and(|gql_req| gql_req.is_running_mutation());

    if is_mutation {
      ctx.short_circuit(
        GraphQLResponse::new_error("mutations are not allowed over GET")
          .into_with_status_code(StatusCode::METHOD_NOT_ALLOWED),
      );
    }
  }
}

pub fn extract_graphql_from_get_request(
  downstream_request: &GatewayHttpRequest,
) -> (
  Option<Mime>,
  Result<GraphQLRequest, ExtractGraphQLOperationError>,
) {
  let accept = extract_accept(&downstream_request.headers);
  let params = parse_query_string(&downstream_request.query_string);

  let operation = params.get("query").filter(|q| !q.is_empty());
  let raw_extensions = params.get("extensions").filter(|e| !e.is_empty());

  if operation.is_none() && raw_extensions.is_none() {
    return (accept, Err(ExtractGraphQLOperationError::EmptyExtraction));
  }

  let variables = match params.get("variables").filter(|v| !v.is_empty()) {
    Some(v) => match parse_json_object(v) {
      Ok(v) => Some(v),
      Err(e) => {
        return (
          accept,
          Err(ExtractGraphQLOperationError::InvalidVariablesJsonFormat(e)),
        )
      }
    },
    None => None,
  };

  let extensions = match raw_extensions {
    Some(v) => match parse_json_object(v) {
      Ok(v) => Some(v),
      Err(e) => {
        return (
          accept,
          Err(ExtractGraphQLOperationError::InvalidExtensionsJsonFormat(e)),
        )
      }
    },
    None => None,
  };

  (
    accept,
    Ok(GraphQLRequest {
      operation: operation.cloned(),
      operation_name: params.get("operationName").cloned(),
      variables,
      extensions,
    }),
  )
}
