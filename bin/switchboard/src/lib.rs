mod websocket;

use std::sync::Arc;

use actix_web::{
  dev::Response,
  http::StatusCode as ActixStatusCode,
  route,
  web::{self, BytesMut},
  App, HttpRequest, HttpResponse, HttpServer, Responder, Scope,
};
use futures_util::StreamExt;
use switchboard_common::http::{
  Bytes, GatewayHttpRequest, GatewayHttpResponse, HeaderName, HeaderValue, HttpHeadersMap,
  Method,
};
use switchboard_config::{GatewayConfig, PORT_ENV_VAR};
use switchboard_engine::{
  gateway::{Gateway, GatewayRouteData},
  transport::TransportKind,
};
use tracing::{debug, info, warn};

/// Bodies above this size are refused before any GraphQL handling.
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

pub async fn run_services(config: GatewayConfig) -> std::io::Result<()> {
  info!("Gateway process started");

  let server_config = config
    .server
    .clone()
    .with_port_override(std::env::var(PORT_ENV_VAR).ok());

  debug!("building gateway from configuration...");
  let gateway = Gateway::new(&config)
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
  let gateway = Arc::new(gateway);

  let http_server = HttpServer::new(move || {
    let mut router = App::new();

    for gateway_route in gateway.routes.iter() {
      let child_router = Scope::new(gateway_route.base_path.as_str())
        .app_data(web::Data::new(gateway_route.route_data.clone()))
        .route("{tail:.*}", web::route().to(handler))
        .route("", web::route().to(handler));

      router = router.service(child_router)
    }

    router.service(health_handler)
  });

  info!(
    "server is listening on {}:{}",
    server_config.host, server_config.port
  );

  http_server
    .bind((server_config.host, server_config.port))?
    .run()
    .await
}

#[route("/_health", method = "GET", method = "HEAD")]
async fn health_handler() -> impl Responder {
  Response::ok()
}

/// Converts the request head. actix speaks `http` 0.2, the gateway `http` 1.x.
fn transform_req(req: &HttpRequest, body: Bytes) -> GatewayHttpRequest {
  let mut headers_map = HttpHeadersMap::new();

  for (key, value) in req.headers().iter() {
    match (
      HeaderName::from_bytes(key.as_str().as_bytes()),
      HeaderValue::from_bytes(value.as_bytes()),
    ) {
      (Ok(key), Ok(value)) => {
        headers_map.append(key, value);
      }
      _ => warn!("dropping unreadable request header {}", key),
    }
  }

  GatewayHttpRequest {
    body,
    headers: headers_map,
    method: Method::from_bytes(req.method().as_str().as_bytes()).unwrap_or_default(),
    uri: req.uri().to_string(),
    query_string: req.query_string().to_string(),
  }
}

fn transform_res(gateway_response: GatewayHttpResponse) -> HttpResponse {
  let status = ActixStatusCode::from_u16(gateway_response.status.as_u16())
    .unwrap_or(ActixStatusCode::INTERNAL_SERVER_ERROR);
  let mut response = HttpResponse::build(status);

  for (key, value) in gateway_response.headers.iter() {
    response.append_header((key.as_str(), value.as_bytes()));
  }

  response.body(gateway_response.body)
}

async fn read_body(mut payload: web::Payload) -> Result<Bytes, HttpResponse> {
  let mut body = BytesMut::new();

  while let Some(chunk) = payload.next().await {
    let chunk = chunk.map_err(|e| HttpResponse::BadRequest().body(e.to_string()))?;

    if body.len() + chunk.len() > MAX_BODY_SIZE {
      return Err(HttpResponse::PayloadTooLarge().finish());
    }

    body.extend_from_slice(&chunk);
  }

  Ok(body.freeze())
}

#[tracing::instrument(
  level = "debug",
  skip(req, payload, route_data),
  name = "switchboard_bin::handler"
)]
async fn handler(
  req: HttpRequest,
  payload: web::Payload,
  route_data: web::Data<Arc<GatewayRouteData>>,
) -> HttpResponse {
  let mut gateway_request = transform_req(&req, Bytes::new());

  if TransportKind::detect(&gateway_request).is_streaming() {
    return match Gateway::authorize_upgrade(&gateway_request, &route_data) {
      Ok(connection) => websocket::upgrade(&req, payload, connection),
      Err(rejection) => transform_res(rejection.into_response()),
    };
  }

  gateway_request.body = match read_body(payload).await {
    Ok(body) => body,
    Err(response) => return response,
  };

  let gateway_response = Gateway::execute(gateway_request, &route_data).await;

  transform_res(gateway_response)
}
