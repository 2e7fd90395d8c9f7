use std::time::Duration;

use e2e::{
  sources::{tick, FieldErrorSource, TickingSource},
  streaming::{complete, subscribe, upgrade_request, StreamingClient},
  suite::TestSuite,
};
use serde_json::{json, Value};
use switchboard_common::http::Bytes;
use switchboard_engine::{
  gateway::Gateway,
  ws::{CloseFrame, CloseReason, InboundFrame, OutboundFrame},
};
use tokio::test;

fn connect(suite: TestSuite, protocol: Option<&str>) -> StreamingClient {
  let route_data = suite.into_route_data();
  let connection = Gateway::authorize_upgrade(&upgrade_request(None, protocol), &route_data)
    .expect("upgrade should be accepted");

  StreamingClient::connect(connection)
}

fn ticking(ticks: Option<u64>) -> TestSuite {
  TestSuite::with_source(TickingSource {
    period: Duration::from_secs(1),
    ticks,
  })
}

fn next(id: &str, data: Value) -> Value {
  json!({ "type": "next", "id": id, "payload": { "data": data } })
}

#[test]
async fn single_result_then_complete() {
  let mut client = connect(TestSuite::default(), Some("graphql-transport-ws"));
  client.init().await;

  client.send(subscribe("1", "query { __typename }"));

  let result = client.recv().await;
  assert_eq!(result["type"], json!("next"));
  assert_eq!(result["id"], json!("1"));
  assert_eq!(result["payload"]["data"]["query"], json!("query { __typename }"));
  assert_eq!(client.recv().await, complete("1"));
}

#[test(start_paused = true)]
async fn streams_every_result() {
  let mut client = connect(ticking(Some(3)), None);
  client.init().await;

  client.send(subscribe("s", "subscription { tick }"));

  for n in 0..3 {
    assert_eq!(client.recv().await, next("s", tick(n)));
  }
  assert_eq!(client.recv().await, complete("s"));
}

#[test(start_paused = true)]
async fn cancelling_one_id_leaves_the_other_running() {
  let mut client = connect(ticking(None), None);
  client.init().await;

  client.send(subscribe("A", "subscription { tick }"));
  client.send(subscribe("B", "subscription { tick }"));

  let mut first_ticks = vec![client.recv().await, client.recv().await];
  first_ticks.sort_by_key(|message| message["id"].as_str().unwrap_or_default().to_string());
  assert_eq!(first_ticks, vec![next("A", tick(0)), next("B", tick(0))]);

  client.send(complete("A"));

  // The client cancel needs no answer, only B keeps producing.
  for n in 1..5 {
    assert_eq!(client.recv().await, next("B", tick(n)));
  }
}

#[test(start_paused = true)]
async fn duplicate_id_is_an_operation_error() {
  let mut client = connect(ticking(None), None);
  client.init().await;

  client.send(subscribe("A", "subscription { tick }"));
  assert_eq!(client.recv().await, next("A", tick(0)));

  client.send(subscribe("A", "subscription { tick }"));
  assert_eq!(
    client.recv().await,
    json!({
      "type": "error",
      "id": "A",
      "payload": [{
        "message": "Subscriber for A already exists",
        "extensions": { "code": "BAD_REQUEST" }
      }]
    })
  );

  // The running operation is untouched.
  assert_eq!(client.recv().await, next("A", tick(1)));
}

#[test]
async fn id_can_be_reused_after_complete() {
  let mut client = connect(TestSuite::default(), None);
  client.init().await;

  for _ in 0..2 {
    client.send(subscribe("same", "{ __typename }"));
    assert_eq!(client.recv().await["type"], json!("next"));
    assert_eq!(client.recv().await, complete("same"));
  }
}

#[test]
async fn subscribe_before_ack_is_unauthorized() {
  let mut client = connect(TestSuite::default(), None);

  client.send(subscribe("1", "{ __typename }"));

  let (messages, code) = client.drain_until_close().await;
  assert!(messages.is_empty());
  assert_eq!(code, Some(4401));
  assert_eq!(client.handle.await.unwrap(), CloseReason::Unauthorized);
}

#[test]
async fn second_init_is_refused() {
  let mut client = connect(TestSuite::default(), None);
  client.init().await;

  client.send(json!({ "type": "connection_init" }));

  assert_eq!(client.drain_until_close().await.1, Some(4429));
}

#[test(start_paused = true)]
async fn missing_init_times_out() {
  let mut client = connect(TestSuite::default(), None);
  let started = tokio::time::Instant::now();

  assert_eq!(client.drain_until_close().await.1, Some(4408));
  assert!(started.elapsed() >= Duration::from_secs(15));
  assert!(started.elapsed() < Duration::from_secs(16));
}

#[test]
async fn malformed_message_with_id_is_reported_to_that_id() {
  let mut client = connect(TestSuite::default(), None);
  client.init().await;

  client.send(json!({ "type": "subscribe", "id": "broken", "payload": "not an object" }));
  let error = client.recv().await;
  assert_eq!(error["type"], json!("error"));
  assert_eq!(error["id"], json!("broken"));

  // The connection is still usable.
  client.send(subscribe("ok", "{ __typename }"));
  assert_eq!(client.recv().await["type"], json!("next"));
}

#[test]
async fn unparsable_operation_is_an_operation_error() {
  let mut client = connect(TestSuite::default(), None);
  client.init().await;

  client.send(subscribe("1", "subscription {"));

  let error = client.recv().await;
  assert_eq!(error["type"], json!("error"));
  assert_eq!(error["id"], json!("1"));
  assert_eq!(
    error["payload"][0]["extensions"]["code"],
    json!("GRAPHQL_PARSE_FAILED")
  );
}

#[test]
async fn execution_errors_do_not_close_the_connection() {
  let mut client = connect(TestSuite::with_source(FieldErrorSource), None);
  client.init().await;

  client.send(subscribe("1", "{ broken }"));
  assert_eq!(
    client.recv().await,
    json!({
      "type": "next",
      "id": "1",
      "payload": { "data": null, "errors": [{ "message": "field resolver failed" }] }
    })
  );
  assert_eq!(client.recv().await, complete("1"));

  client.send(json!({ "type": "ping" }));
  assert_eq!(client.recv().await, json!({ "type": "pong" }));
}

#[test]
async fn pings_are_answered() {
  let mut client = connect(TestSuite::default(), None);
  client.init().await;

  client.send(json!({ "type": "ping", "payload": { "at": 1 } }));
  assert_eq!(
    client.recv().await,
    json!({ "type": "pong", "payload": { "at": 1 } })
  );

  client.send_frame(InboundFrame::Ping(Bytes::from_static(b"probe")));
  assert_eq!(
    client.recv_frame().await,
    Some(OutboundFrame::Pong(Bytes::from_static(b"probe")))
  );
}

#[test]
async fn terminate_and_peer_close() {
  let mut client = connect(TestSuite::default(), Some("graphql-ws"));
  client.init().await;
  client.send(json!({ "type": "connection_terminate" }));
  assert_eq!(client.drain_until_close().await.1, Some(1000));

  let mut client = connect(TestSuite::default(), None);
  client.init().await;
  client.send_frame(InboundFrame::Close(Some(CloseFrame::new(1000, "bye"))));
  assert_eq!(client.drain_until_close().await.1, Some(1000));
  assert_eq!(
    client.handle.await.unwrap(),
    CloseReason::PeerClosed(Some(CloseFrame::new(1000, "bye")))
  );
}

#[test(start_paused = true)]
async fn closing_notifies_every_open_operation() {
  let mut client = connect(ticking(None), None);
  client.init().await;

  client.send(subscribe("A", "subscription { tick }"));
  client.send(subscribe("B", "subscription { tick }"));
  client.recv().await;
  client.recv().await;

  client.send_frame(InboundFrame::Close(None));

  let (messages, _) = client.drain_until_close().await;
  let mut completed = messages
    .iter()
    .filter(|message| message["type"] == json!("complete"))
    .filter_map(|message| message["id"].as_str())
    .collect::<Vec<_>>();
  completed.sort();

  assert_eq!(completed, vec!["A", "B"]);
}

#[test(start_paused = true)]
async fn legacy_protocol() {
  let mut client = connect(ticking(None), Some("graphql-ws"));

  client.send(json!({ "type": "connection_init", "payload": {} }));
  assert_eq!(client.recv().await, json!({ "type": "connection_ack" }));

  client.send(json!({
    "type": "start",
    "id": "1",
    "payload": { "query": "subscription { tick }" }
  }));
  assert_eq!(
    client.recv().await,
    json!({ "type": "data", "id": "1", "payload": { "data": tick(0) } })
  );

  client.send(json!({ "type": "stop", "id": "1" }));
  client.send(json!({ "type": "unknown" }));
  assert_eq!(client.recv().await["type"], json!("connection_error"));
}
