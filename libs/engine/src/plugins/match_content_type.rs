use switchboard_common::{
  execute::RequestExecutionContext,
  graphql::APPLICATION_GRAPHQL_JSON,
  http::{extract_accept, GatewayHttpResponse, HeaderValue, APPLICATION_JSON, CONTENT_TYPE},
  plugin::Plugin,
};

/// Sets the response `content-type` from the request `accept` header, unless a previous plugin did.
#[derive(Debug)]
pub struct MatchContentTypePlugin {}

#[async_trait::async_trait]
impl Plugin for MatchContentTypePlugin {
  fn on_downstream_http_response(
    &self,
    ctx: &mut RequestExecutionContext,
    response: &mut GatewayHttpResponse,
  ) {
    let headers = &mut response.headers;

    if headers.get(CONTENT_TYPE).is_some() || response.body.is_empty() {
      return;
    }

    let accept_header =
      extract_accept(&ctx.downstream_http_request.headers).unwrap_or(APPLICATION_JSON);

    if accept_header == APPLICATION_GRAPHQL_JSON {
      headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(APPLICATION_GRAPHQL_JSON),
      );
    } else {
      headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
  }
}
