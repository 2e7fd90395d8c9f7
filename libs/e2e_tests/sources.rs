use std::{sync::Arc, time::Duration};

use futures::stream;
use serde_json::{json, Value};
use switchboard_common::graphql::{GraphQLError, GraphQLResponse, ParsedGraphQLRequest};
use switchboard_engine::source::runtime::{SourceFuture, SourceRuntime, SourceStream};
use tokio::time::{interval, MissedTickBehavior};

/// Answers every operation with what it received, so tests can see what reached the source.
#[derive(Debug, Default)]
pub struct EchoSource;

impl SourceRuntime for EchoSource {
  fn execute<'a>(&'a self, request: &'a ParsedGraphQLRequest) -> SourceFuture<'a> {
    Box::pin(async move {
      Ok(GraphQLResponse::new_data(json!({
        "query": request.request.operation,
        "operationName": request.request.operation_name,
        "variables": request.request.variables,
      })))
    })
  }
}

/// Fails every operation with a field error, the way a resolver would.
#[derive(Debug, Default)]
pub struct FieldErrorSource;

impl SourceRuntime for FieldErrorSource {
  fn execute<'a>(&'a self, _request: &'a ParsedGraphQLRequest) -> SourceFuture<'a> {
    Box::pin(async move {
      Ok(GraphQLResponse::new_data_with_errors(
        Value::Null,
        vec![GraphQLError::new("field resolver failed")],
      ))
    })
  }
}

/// A subscription source emitting `{ "tick": n }` on a fixed period, starting right away.
///
/// `ticks: None` never completes.
#[derive(Debug, Clone)]
pub struct TickingSource {
  pub period: Duration,
  pub ticks: Option<u64>,
}

impl TickingSource {
  pub fn endless(period: Duration) -> Self {
    Self {
      period,
      ticks: None,
    }
  }

  pub fn limited(period: Duration, ticks: u64) -> Self {
    Self {
      period,
      ticks: Some(ticks),
    }
  }
}

pub fn tick(n: u64) -> Value {
  json!({ "tick": n })
}

impl SourceRuntime for TickingSource {
  fn execute<'a>(&'a self, _request: &'a ParsedGraphQLRequest) -> SourceFuture<'a> {
    Box::pin(async move { Ok(GraphQLResponse::new_data(tick(0))) })
  }

  fn execute_stream(self: Arc<Self>, _request: ParsedGraphQLRequest) -> SourceStream {
    let mut ticker = interval(self.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    Box::pin(stream::unfold((ticker, 0u64), move |(mut ticker, n)| {
      let limit = self.ticks;

      async move {
        if limit.is_some_and(|limit| n >= limit) {
          return None;
        }

        ticker.tick().await;

        Some((GraphQLResponse::new_data(tick(n)), (ticker, n + 1)))
      }
    }))
  }
}
