use crate::{
  graphql::{GraphQLRequest, ParsedGraphQLRequest},
  http::{GatewayHttpRequest, GatewayHttpResponse},
};

/// Per-request state shared by the dispatcher and the plugins.
///
/// A transport plugin stores what it extracted in `extracted_graphql_request`; the
/// dispatcher resolves persisted queries and parses it into `downstream_graphql_request`.
#[derive(Debug)]
pub struct RequestExecutionContext {
  pub downstream_http_request: GatewayHttpRequest,
  pub extracted_graphql_request: Option<GraphQLRequest>,
  pub downstream_graphql_request: Option<ParsedGraphQLRequest>,
  pub short_circuit_response: Option<GatewayHttpResponse>,
}

impl RequestExecutionContext {
  pub fn new(downstream_http_request: GatewayHttpRequest) -> Self {
    RequestExecutionContext {
      downstream_http_request,
      extracted_graphql_request: None,
      downstream_graphql_request: None,
      short_circuit_response: None,
    }
  }

  pub fn short_circuit(&mut self, response: GatewayHttpResponse) {
    self.short_circuit_response = Some(response);
  }

  pub fn is_short_circuit(&self) -> bool {
    self.short_circuit_response.is_some()
  }

  pub fn take_short_circuit(&mut self) -> Option<GatewayHttpResponse> {
    self.short_circuit_response.take()
  }

  pub fn has_extracted_request(&self) -> bool {
    self.extracted_graphql_request.is_some()
  }
}
