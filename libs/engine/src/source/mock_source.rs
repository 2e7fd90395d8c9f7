use switchboard_common::graphql::{GraphQLResponse, ParsedGraphQLRequest};
use switchboard_config::MockedSourceConfig;

use super::runtime::{SourceError, SourceFuture, SourceRuntime};

#[derive(Debug)]
pub struct MockedSourceRuntime {
  pub config: MockedSourceConfig,
}

impl MockedSourceRuntime {
  pub fn new(config: MockedSourceConfig) -> Self {
    Self { config }
  }
}

impl SourceRuntime for MockedSourceRuntime {
  fn execute<'a>(&'a self, _request: &'a ParsedGraphQLRequest) -> SourceFuture<'a> {
    Box::pin(async move {
      serde_json::from_value::<GraphQLResponse>(self.config.response_data.clone())
        .map_err(SourceError::InvalidResponse)
    })
  }
}
