use switchboard_common::http::{header, header_str, GatewayHttpRequest, Method};

/// The wire protocol an inbound request is speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
  HttpGet,
  HttpPost,
  Options,
  /// An HTTP/1.1 `Upgrade: websocket` request.
  Streaming,
  Unsupported,
}

impl TransportKind {
  pub fn detect(request: &GatewayHttpRequest) -> Self {
    if request.method == Method::GET && is_websocket_upgrade(request) {
      return TransportKind::Streaming;
    }

    match request.method {
      Method::GET | Method::HEAD => TransportKind::HttpGet,
      Method::POST => TransportKind::HttpPost,
      Method::OPTIONS => TransportKind::Options,
      _ => TransportKind::Unsupported,
    }
  }

  pub fn is_streaming(&self) -> bool {
    matches!(self, TransportKind::Streaming)
  }
}

fn is_websocket_upgrade(request: &GatewayHttpRequest) -> bool {
  let upgrade = header_str(&request.headers, header::UPGRADE.as_str())
    .is_some_and(|value| value.eq_ignore_ascii_case("websocket"));
  let connection = header_str(&request.headers, header::CONNECTION.as_str()).is_some_and(|value| {
    value
      .split(',')
      .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
  });

  upgrade && connection
}

#[cfg(test)]
mod tests {
  use super::*;
  use switchboard_common::http::ToHeadersMap;

  fn request(method: Method, headers: Vec<(&str, &str)>) -> GatewayHttpRequest {
    GatewayHttpRequest {
      method,
      headers: headers.to_headers_map().unwrap(),
      ..Default::default()
    }
  }

  #[test]
  fn detects_by_method() {
    assert_eq!(
      TransportKind::detect(&request(Method::GET, vec![])),
      TransportKind::HttpGet
    );
    assert_eq!(
      TransportKind::detect(&request(Method::POST, vec![])),
      TransportKind::HttpPost
    );
    assert_eq!(
      TransportKind::detect(&request(Method::OPTIONS, vec![])),
      TransportKind::Options
    );
    assert_eq!(
      TransportKind::detect(&request(Method::DELETE, vec![])),
      TransportKind::Unsupported
    );
  }

  #[test]
  fn detects_websocket_upgrade() {
    let upgrade = request(
      Method::GET,
      vec![("upgrade", "WebSocket"), ("connection", "keep-alive, Upgrade")],
    );

    assert_eq!(TransportKind::detect(&upgrade), TransportKind::Streaming);
  }

  #[test]
  fn upgrade_header_alone_is_not_enough() {
    let upgrade = request(Method::GET, vec![("upgrade", "websocket")]);

    assert_eq!(TransportKind::detect(&upgrade), TransportKind::HttpGet);
  }
}
