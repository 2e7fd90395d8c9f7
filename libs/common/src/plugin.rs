use std::fmt::Debug;

use crate::{
  execute::RequestExecutionContext, graphql::GraphQLRequest, http::GatewayHttpResponse,
};

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
  #[error("Plugin init error: {source}")]
  InitError { source: anyhow::Error },
}

#[async_trait::async_trait]
pub trait CreatablePlugin: Plugin {
  type Config;

  async fn create(config: Self::Config) -> Result<Box<Self>, PluginError>;
}

#[async_trait::async_trait]
pub trait Plugin: Sync + Send + Debug {
  // From: on_downstream_http_request -> on_downstream_graphql_request -> on_upstream_graphql_request
  // To: on_downstream_http_response
  // Step 1: An HTTP request sent from the client to the gateway
  async fn on_downstream_http_request(&self, _ctx: &mut RequestExecutionContext) {}
  // Step 2: The GraphQL operation was extracted and parsed
  async fn on_downstream_graphql_request(&self, _ctx: &mut RequestExecutionContext) {}
  // Step 3: The GraphQL request is about to be sent to the source
  async fn on_upstream_graphql_request(&self, _req: &mut GraphQLRequest) {}
  // Step 4: A final HTTP response sent from the gateway to the client
  fn on_downstream_http_response(
    &self,
    _ctx: &mut RequestExecutionContext,
    _response: &mut GatewayHttpResponse,
  ) {
  }
}
