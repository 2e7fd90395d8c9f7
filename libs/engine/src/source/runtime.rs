use std::{fmt::Debug, future::Future, pin::Pin, sync::Arc};

use futures::{stream, Stream};
use switchboard_common::{
  graphql::{GraphQLResponse, ParsedGraphQLRequest},
  http::StatusCode,
};

pub type SourceFuture<'a> =
  Pin<Box<dyn Future<Output = Result<GraphQLResponse, SourceError>> + Send + 'a>>;
pub type SourceStream = Pin<Box<dyn Stream<Item = GraphQLResponse> + Send + 'static>>;

/// The schema execution engine behind an endpoint.
pub trait SourceRuntime: Debug + Send + Sync + 'static {
  fn execute<'a>(&'a self, request: &'a ParsedGraphQLRequest) -> SourceFuture<'a>;

  /// Executes an operation that may produce many results, e.g. a subscription.
  ///
  /// Sources without native streaming answer with a single result. Errors are part of the
  /// stream items and never end the connection carrying it.
  fn execute_stream(self: Arc<Self>, request: ParsedGraphQLRequest) -> SourceStream {
    Box::pin(stream::once(async move {
      self
        .execute(&request)
        .await
        .unwrap_or_else(GraphQLResponse::from)
    }))
  }
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
  #[error("unexpected HTTP status: {0}")]
  UnexpectedHTTPStatusError(StatusCode),
  #[error("network error: {0}")]
  NetworkError(reqwest::Error),
  #[error("invalid upstream response: {0}")]
  InvalidResponse(serde_json::Error),
}

impl From<SourceError> for GraphQLResponse {
  fn from(error: SourceError) -> Self {
    GraphQLResponse::new_error(&error.to_string())
  }
}
