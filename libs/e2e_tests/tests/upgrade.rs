use e2e::{
  streaming::upgrade_request,
  suite::TestSuite,
};
use switchboard_common::http::StatusCode;
use switchboard_engine::{
  gateway::{Gateway, UpgradeRejection},
  transport::TransportKind,
  ws::WsProtocol,
};
use tokio::test;

fn authorize(origin: Option<&str>, protocol: Option<&str>) -> Result<WsProtocol, UpgradeRejection> {
  let route_data = TestSuite::default().into_route_data();

  Gateway::authorize_upgrade(&upgrade_request(origin, protocol), &route_data)
    .map(|connection| connection.protocol())
}

#[test]
async fn upgrade_is_detected_as_streaming() {
  assert_eq!(
    TransportKind::detect(&upgrade_request(None, None)),
    TransportKind::Streaming
  );
}

#[test]
async fn allow_listed_origins_are_accepted() {
  assert!(authorize(Some("http://localhost:8080"), None).is_ok());
  assert!(authorize(Some("http://localhost:8000"), None).is_ok());
}

#[test]
async fn origins_outside_the_list_are_refused() {
  assert_eq!(
    authorize(Some("https://evil.example.com"), None),
    Err(UpgradeRejection::OriginNotAllowed)
  );
  // Matching is exact.
  assert_eq!(
    authorize(Some("http://LOCALHOST:8080"), None),
    Err(UpgradeRejection::OriginNotAllowed)
  );
  assert_eq!(
    authorize(Some("http://localhost:8080/"), None),
    Err(UpgradeRejection::OriginNotAllowed)
  );
  assert_eq!(
    UpgradeRejection::OriginNotAllowed.into_response().status,
    StatusCode::FORBIDDEN
  );
}

#[test]
async fn missing_or_same_host_origin_is_accepted() {
  assert!(authorize(None, None).is_ok());
  assert!(authorize(Some(""), None).is_ok());
  // The request host is `localhost:4000`.
  assert!(authorize(Some("localhost:4000"), None).is_ok());
}

#[test]
async fn subprotocol_is_negotiated() {
  assert_eq!(
    authorize(None, Some("graphql-ws")),
    Ok(WsProtocol::GraphQLWs)
  );
  assert_eq!(
    authorize(None, Some("graphql-transport-ws")),
    Ok(WsProtocol::GraphQLTransportWs)
  );
  assert_eq!(
    authorize(None, Some("something-else")),
    Ok(WsProtocol::GraphQLTransportWs)
  );
}

#[test]
async fn disabled_streaming_refuses_every_upgrade() {
  let route_data = TestSuite {
    streaming: None,
    ..Default::default()
  }
  .into_route_data();

  let rejection = Gateway::authorize_upgrade(&upgrade_request(None, None), &route_data)
    .map(|connection| connection.protocol())
    .unwrap_err();

  assert_eq!(rejection, UpgradeRejection::StreamingDisabled);
}

#[test]
async fn upgrade_requests_are_not_executed_as_http() {
  let response = TestSuite::default()
    .run_http_request(upgrade_request(None, None))
    .await;

  assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
}
