use futures::channel::mpsc::{unbounded, UnboundedSender};
use serde_json::{json, Value};
use switchboard_common::http::{GatewayHttpRequest, Method, ToHeadersMap};
use switchboard_engine::ws::{CloseReason, InboundFrame, OutboundFrame, StreamingConnection};
use tokio::{sync::mpsc, task::JoinHandle};

/// Builds the head of a WebSocket upgrade request.
pub fn upgrade_request(origin: Option<&str>, protocol: Option<&str>) -> GatewayHttpRequest {
  let mut headers = vec![
    ("upgrade", "websocket"),
    ("connection", "Upgrade"),
    ("host", "localhost:4000"),
  ];

  if let Some(origin) = origin {
    headers.push(("origin", origin));
  }

  if let Some(protocol) = protocol {
    headers.push(("sec-websocket-protocol", protocol));
  }

  GatewayHttpRequest {
    method: Method::GET,
    headers: headers.to_headers_map().unwrap(),
    body: Default::default(),
    ..Default::default()
  }
}

/// The client side of an in-process streaming connection.
pub struct StreamingClient {
  inbound: UnboundedSender<InboundFrame>,
  outbound: mpsc::Receiver<OutboundFrame>,
  pub handle: JoinHandle<CloseReason>,
}

impl StreamingClient {
  pub fn connect(connection: StreamingConnection) -> Self {
    let (inbound, inbound_rx) = unbounded();
    let (outbound_tx, outbound) = mpsc::channel(64);
    let handle = tokio::spawn(connection.serve(inbound_rx, outbound_tx));

    Self {
      inbound,
      outbound,
      handle,
    }
  }

  pub fn send(&self, message: Value) {
    self.send_frame(InboundFrame::Text(message.to_string()));
  }

  pub fn send_frame(&self, frame: InboundFrame) {
    // The connection may already be gone, tests assert on what it sent instead.
    let _ = self.inbound.unbounded_send(frame);
  }

  pub async fn recv_frame(&mut self) -> Option<OutboundFrame> {
    self.outbound.recv().await
  }

  /// Next protocol message, skipping heartbeats.
  pub async fn recv(&mut self) -> Value {
    loop {
      match self.recv_frame().await {
        Some(OutboundFrame::Text(text)) => {
          let message: Value = serde_json::from_str(&text).unwrap();

          if !is_heartbeat(&message) {
            return message;
          }
        }
        Some(OutboundFrame::Ping(_)) | Some(OutboundFrame::Pong(_)) => continue,
        other => panic!("expected a protocol message, got {:?}", other),
      }
    }
  }

  /// Sends `connection_init` and waits for the acknowledgement.
  pub async fn init(&mut self) {
    self.send(json!({ "type": "connection_init" }));
    assert_eq!(self.recv().await, json!({ "type": "connection_ack" }));
  }

  /// Collects protocol messages up to the close frame and returns them with its code.
  pub async fn drain_until_close(&mut self) -> (Vec<Value>, Option<u16>) {
    let mut messages = vec![];

    loop {
      match self.recv_frame().await {
        Some(OutboundFrame::Text(text)) => {
          let message: Value = serde_json::from_str(&text).unwrap();

          if !is_heartbeat(&message) {
            messages.push(message);
          }
        }
        Some(OutboundFrame::Close(frame)) => {
          return (messages, frame.map(|frame| frame.code));
        }
        Some(_) => continue,
        None => return (messages, None),
      }
    }
  }
}

fn is_heartbeat(message: &Value) -> bool {
  matches!(message["type"].as_str(), Some("ping") | Some("ka"))
}

pub fn subscribe(id: &str, query: &str) -> Value {
  json!({ "type": "subscribe", "id": id, "payload": { "query": query } })
}

pub fn complete(id: &str) -> Value {
  json!({ "type": "complete", "id": id })
}
