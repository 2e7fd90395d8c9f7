use std::sync::Arc;

use e2e::{
  streaming::{StreamingClient, upgrade_request},
  suite::{create_plugin, get_request, post_request, query_string, TestSuite},
};
use serde_json::{json, Value};
use switchboard_cache::PersistedQueryCache;
use switchboard_common::{graphql::GraphQLRequest, http::StatusCode};
use switchboard_engine::{gateway::Gateway, persisted_queries::hash_query};
use tokio::test;

const QUERY: &str = "query Persisted { __typename }";

fn persisted(query: Option<&str>, hash: &str) -> GraphQLRequest {
  GraphQLRequest {
    operation: query.map(ToString::to_string),
    extensions: json!({ "persistedQuery": { "version": 1, "sha256Hash": hash } })
      .as_object()
      .cloned(),
    ..Default::default()
  }
}

fn json_body(body: &[u8]) -> Value {
  serde_json::from_slice(body).unwrap()
}

fn not_found() -> Value {
  json!({
    "errors": [{
      "message": "PersistedQueryNotFound",
      "extensions": { "code": "PERSISTED_QUERY_NOT_FOUND" }
    }]
  })
}

#[test]
async fn round_trip_over_post() {
  let route_data = TestSuite::default().into_route_data();
  let hash = hash_query(QUERY);

  let miss = Gateway::execute(post_request(&persisted(None, &hash)), &route_data).await;
  assert_eq!(miss.status, StatusCode::OK);
  assert_eq!(json_body(&miss.body), not_found());

  let register = Gateway::execute(post_request(&persisted(Some(QUERY), &hash)), &route_data).await;
  assert_eq!(register.status, StatusCode::OK);
  assert_eq!(json_body(&register.body)["data"]["query"], json!(QUERY));

  let hit = Gateway::execute(post_request(&persisted(None, &hash)), &route_data).await;
  assert_eq!(hit.status, StatusCode::OK);
  assert_eq!(json_body(&hit.body)["data"]["query"], json!(QUERY));
}

#[test]
async fn registered_over_post_resolves_over_get_and_streaming() {
  let route_data = TestSuite {
    plugins: vec![create_plugin::<http_get_plugin::Plugin>(Default::default()).await],
    ..Default::default()
  }
  .into_route_data();
  let hash = hash_query(QUERY);

  Gateway::execute(post_request(&persisted(Some(QUERY), &hash)), &route_data).await;

  let extensions = json!({ "persistedQuery": { "version": 1, "sha256Hash": hash } }).to_string();
  let get = Gateway::execute(
    get_request(&query_string(&[("extensions", &extensions)])),
    &route_data,
  )
  .await;
  assert_eq!(get.status, StatusCode::OK);
  assert_eq!(json_body(&get.body)["data"]["query"], json!(QUERY));

  let connection = Gateway::authorize_upgrade(&upgrade_request(None, None), &route_data).unwrap();
  let mut client = StreamingClient::connect(connection);
  client.init().await;
  client.send(json!({
    "type": "subscribe",
    "id": "1",
    "payload": { "extensions": { "persistedQuery": { "version": 1, "sha256Hash": hash } } }
  }));

  let next = client.recv().await;
  assert_eq!(next["type"], json!("next"));
  assert_eq!(next["payload"]["data"]["query"], json!(QUERY));
  assert_eq!(client.recv().await, json!({ "type": "complete", "id": "1" }));
}

#[test]
async fn streaming_miss_is_an_operation_error() {
  let route_data = TestSuite::default().into_route_data();
  let connection = Gateway::authorize_upgrade(&upgrade_request(None, None), &route_data).unwrap();
  let mut client = StreamingClient::connect(connection);
  client.init().await;

  client.send(json!({
    "type": "subscribe",
    "id": "1",
    "payload": { "extensions": { "persistedQuery": { "version": 1, "sha256Hash": hash_query(QUERY) } } }
  }));

  assert_eq!(
    client.recv().await,
    json!({
      "type": "error",
      "id": "1",
      "payload": [{
        "message": "PersistedQueryNotFound",
        "extensions": { "code": "PERSISTED_QUERY_NOT_FOUND" }
      }]
    })
  );
}

#[test]
async fn hash_mismatch_is_rejected_and_not_cached() {
  let cache = Arc::new(PersistedQueryCache::new(10));
  let route_data = TestSuite {
    persisted_queries: Some(cache.clone()),
    ..Default::default()
  }
  .into_route_data();
  let wrong_hash = hash_query("query Other { __typename }");

  let response = Gateway::execute(
    post_request(&persisted(Some(QUERY), &wrong_hash)),
    &route_data,
  )
  .await;

  assert_eq!(response.status, StatusCode::BAD_REQUEST);
  assert_eq!(
    json_body(&response.body)["errors"][0]["extensions"]["code"],
    json!("PERSISTED_QUERY_HASH_MISMATCH")
  );
  assert!(cache.is_empty());

  let miss = Gateway::execute(post_request(&persisted(None, &wrong_hash)), &route_data).await;
  assert_eq!(json_body(&miss.body), not_found());
}

#[test]
async fn unsupported_version() {
  let request = GraphQLRequest {
    extensions: json!({ "persistedQuery": { "version": 2, "sha256Hash": hash_query(QUERY) } })
      .as_object()
      .cloned(),
    ..GraphQLRequest::new(QUERY)
  };

  let response = TestSuite::default().run_graphql_request(request).await;

  assert_eq!(response.status, StatusCode::BAD_REQUEST);
  assert_eq!(
    json_body(&response.body)["errors"][0]["extensions"]["code"],
    json!("PERSISTED_QUERY_VERSION_NOT_SUPPORTED")
  );
}

#[test]
async fn least_recently_used_hash_is_evicted() {
  let route_data = TestSuite {
    persisted_queries: Some(Arc::new(PersistedQueryCache::new(2))),
    ..Default::default()
  }
  .into_route_data();
  let queries = ["query A { a }", "query B { b }", "query C { c }"];
  let hashes = queries.map(hash_query);

  Gateway::execute(post_request(&persisted(Some(queries[0]), &hashes[0])), &route_data).await;
  Gateway::execute(post_request(&persisted(Some(queries[1]), &hashes[1])), &route_data).await;
  // Touch A, so B becomes the least recently used.
  Gateway::execute(post_request(&persisted(None, &hashes[0])), &route_data).await;
  Gateway::execute(post_request(&persisted(Some(queries[2]), &hashes[2])), &route_data).await;

  let a = Gateway::execute(post_request(&persisted(None, &hashes[0])), &route_data).await;
  assert_eq!(json_body(&a.body)["data"]["query"], json!(queries[0]));

  let b = Gateway::execute(post_request(&persisted(None, &hashes[1])), &route_data).await;
  assert_eq!(json_body(&b.body), not_found());

  let c = Gateway::execute(post_request(&persisted(None, &hashes[2])), &route_data).await;
  assert_eq!(json_body(&c.body)["data"]["query"], json!(queries[2]));
}

#[test]
async fn disabled_cache_ignores_extension() {
  let response = TestSuite {
    persisted_queries: None,
    ..Default::default()
  }
  .run_graphql_request(persisted(Some(QUERY), "not-a-real-hash"))
  .await;

  assert_eq!(response.status, StatusCode::OK);
  assert_eq!(json_body(&response.body)["data"]["query"], json!(QUERY));
}
