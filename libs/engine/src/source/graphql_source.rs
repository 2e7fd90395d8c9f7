use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use switchboard_common::{
  graphql::{GraphQLResponse, ParsedGraphQLRequest},
  http::Bytes,
};
use switchboard_config::GraphQLSourceConfig;
use tracing::debug;

use super::runtime::{SourceError, SourceFuture, SourceRuntime};

#[derive(Debug)]
pub struct GraphQLSourceRuntime {
  pub fetcher: Client,
  pub config: GraphQLSourceConfig,
}

impl GraphQLSourceRuntime {
  pub fn new(config: GraphQLSourceConfig) -> Self {
    Self {
      fetcher: Client::new(),
      config,
    }
  }
}

impl SourceRuntime for GraphQLSourceRuntime {
  #[tracing::instrument(skip(self, request), name = "GraphQLSourceRuntime::execute")]
  fn execute<'a>(&'a self, request: &'a ParsedGraphQLRequest) -> SourceFuture<'a> {
    Box::pin(async move {
      let body: Bytes = (&request.request).into();

      debug!(
        "sending upstream request to {}: {:?}",
        self.config.endpoint, request.request
      );

      let upstream_response = self
        .fetcher
        .post(&self.config.endpoint)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .map_err(SourceError::NetworkError)?;

      match upstream_response.status() {
        StatusCode::OK => {
          let body = upstream_response
            .bytes()
            .await
            .map_err(SourceError::NetworkError)?;

          serde_json::from_slice::<GraphQLResponse>(&body).map_err(SourceError::InvalidResponse)
        }
        code => Err(SourceError::UnexpectedHTTPStatusError(code)),
      }
    })
  }
}
