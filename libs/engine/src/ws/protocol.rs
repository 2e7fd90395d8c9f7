//! GraphQL over WebSocket wire formats.
//!
//! Two subprotocols are spoken on the same endpoint:
//! - `graphql-transport-ws`: https://github.com/enisdenjo/graphql-ws/blob/master/PROTOCOL.md
//! - `graphql-ws`, the legacy `subscriptions-transport-ws` protocol.
//!
//! Both are decoded into [`ClientMessage`] and encoded from [`ServerMessage`], so the connection
//! state machine does not care which one the client picked.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_common::{
  graphql::{GraphQLError, GraphQLRequest, GraphQLResponse},
  http::Bytes,
};

pub const GRAPHQL_TRANSPORT_WS: &str = "graphql-transport-ws";
pub const GRAPHQL_WS: &str = "graphql-ws";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsProtocol {
  GraphQLTransportWs,
  GraphQLWs,
}

impl WsProtocol {
  /// Picks the first supported subprotocol from a `Sec-WebSocket-Protocol` header value.
  /// Falls back to `graphql-transport-ws` when none is requested or none is known.
  pub fn negotiate(requested: Option<&str>) -> Self {
    requested
      .into_iter()
      .flat_map(|value| value.split(','))
      .find_map(|candidate| match candidate.trim() {
        GRAPHQL_TRANSPORT_WS => Some(WsProtocol::GraphQLTransportWs),
        GRAPHQL_WS => Some(WsProtocol::GraphQLWs),
        _ => None,
      })
      .unwrap_or(WsProtocol::GraphQLTransportWs)
  }

  pub fn name(&self) -> &'static str {
    match self {
      WsProtocol::GraphQLTransportWs => GRAPHQL_TRANSPORT_WS,
      WsProtocol::GraphQLWs => GRAPHQL_WS,
    }
  }

  pub fn decode(&self, text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: Value =
      serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    let id = value
      .get("id")
      .and_then(Value::as_str)
      .map(ToString::to_string);

    let decoded = match self {
      WsProtocol::GraphQLTransportWs => {
        serde_json::from_value::<TransportWsClientFrame>(value).map(ClientMessage::from)
      }
      WsProtocol::GraphQLWs => {
        serde_json::from_value::<LegacyClientFrame>(value).map(ClientMessage::from)
      }
    };

    decoded.map_err(|e| ProtocolError::InvalidMessage {
      id,
      reason: e.to_string(),
    })
  }

  /// Encodes a message, or returns `None` when the protocol has no such message.
  pub fn encode(&self, message: &ServerMessage) -> Option<String> {
    let encoded = match self {
      WsProtocol::GraphQLTransportWs => {
        let frame = match message {
          ServerMessage::ConnectionAck => TransportWsServerFrame::ConnectionAck,
          ServerMessage::Next { id, payload } => TransportWsServerFrame::Next { id, payload },
          ServerMessage::Error { id, payload } => TransportWsServerFrame::Error { id, payload },
          ServerMessage::Complete { id } => TransportWsServerFrame::Complete { id },
          ServerMessage::Ping => TransportWsServerFrame::Ping,
          ServerMessage::Pong { payload } => TransportWsServerFrame::Pong {
            payload: payload.as_ref(),
          },
          ServerMessage::KeepAlive | ServerMessage::ConnectionError { .. } => return None,
        };

        serde_json::to_string(&frame)
      }
      WsProtocol::GraphQLWs => {
        let frame = match message {
          ServerMessage::ConnectionAck => LegacyServerFrame::ConnectionAck,
          ServerMessage::Next { id, payload } => LegacyServerFrame::Data { id, payload },
          ServerMessage::Error { id, payload } => LegacyServerFrame::Error { id, payload },
          ServerMessage::Complete { id } => LegacyServerFrame::Complete { id },
          ServerMessage::KeepAlive => LegacyServerFrame::Ka,
          ServerMessage::ConnectionError { message } => LegacyServerFrame::ConnectionError {
            payload: GraphQLError::new(message),
          },
          ServerMessage::Ping | ServerMessage::Pong { .. } => return None,
        };

        serde_json::to_string(&frame)
      }
    };

    encoded.ok()
  }

  /// Frames sent on every liveness tick. The peer is expected to acknowledge them with a
  /// `pong` message or a WebSocket pong frame.
  pub fn heartbeat(&self) -> Vec<OutboundFrame> {
    match self {
      WsProtocol::GraphQLTransportWs => self
        .encode(&ServerMessage::Ping)
        .map(OutboundFrame::Text)
        .into_iter()
        .collect(),
      // `ka` is informative only, the legacy protocol has no acknowledgement message.
      WsProtocol::GraphQLWs => self
        .encode(&ServerMessage::KeepAlive)
        .map(OutboundFrame::Text)
        .into_iter()
        .chain([OutboundFrame::Ping(Bytes::from_static(b"heartbeat"))])
        .collect(),
    }
  }
}

/// Client to server messages, independent of the subprotocol.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
  ConnectionInit { payload: Option<Value> },
  Subscribe { id: String, payload: GraphQLRequest },
  Complete { id: String },
  Ping { payload: Option<Value> },
  Pong,
  Terminate,
}

/// Server to client messages, independent of the subprotocol.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
  ConnectionAck,
  Next { id: String, payload: GraphQLResponse },
  Error { id: String, payload: Vec<GraphQLError> },
  Complete { id: String },
  Ping,
  Pong { payload: Option<Value> },
  KeepAlive,
  ConnectionError { message: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
  #[error("message is not valid JSON: {0}")]
  InvalidJson(String),
  #[error("invalid message: {reason}")]
  InvalidMessage { id: Option<String>, reason: String },
  #[error("binary messages are not supported")]
  BinaryMessage,
}

impl ProtocolError {
  /// The operation the malformed message was addressed to, if it could be read.
  pub fn operation_id(&self) -> Option<&str> {
    match self {
      ProtocolError::InvalidMessage { id, .. } => id.as_deref(),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
  Text(String),
  Binary(Bytes),
  Ping(Bytes),
  Pong(Bytes),
  Close(Option<CloseFrame>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
  Text(String),
  Ping(Bytes),
  Pong(Bytes),
  Close(Option<CloseFrame>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloseFrame {
  pub code: u16,
  pub reason: String,
}

impl CloseFrame {
  pub fn new(code: u16, reason: impl Into<String>) -> Self {
    Self {
      code,
      reason: reason.into(),
    }
  }
}

/// Why a streaming connection ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
  /// Client sent `connection_terminate` or the server is shutting down.
  Normal,
  /// `subscribe` before the connection was acknowledged.
  Unauthorized,
  /// No `connection_init` within the configured wait time.
  InitTimeout,
  /// A second `connection_init`.
  TooManyInitRequests,
  /// Heartbeats were not acknowledged in time.
  HeartbeatTimeout,
  /// The client closed the connection, the frame is echoed back.
  PeerClosed(Option<CloseFrame>),
  /// The underlying transport is gone, nothing can be sent anymore.
  Disconnected,
}

impl CloseReason {
  pub fn frame(&self) -> Option<CloseFrame> {
    match self {
      CloseReason::Normal => Some(CloseFrame::new(1000, "Normal Closure")),
      CloseReason::Unauthorized => Some(CloseFrame::new(4401, "Unauthorized")),
      CloseReason::InitTimeout => Some(CloseFrame::new(
        4408,
        "Connection initialisation timeout",
      )),
      CloseReason::TooManyInitRequests => {
        Some(CloseFrame::new(4429, "Too many initialisation requests"))
      }
      CloseReason::HeartbeatTimeout => Some(CloseFrame::new(1001, "Heartbeat timeout")),
      CloseReason::PeerClosed(frame) => frame.clone(),
      CloseReason::Disconnected => None,
    }
  }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TransportWsClientFrame {
  ConnectionInit {
    #[serde(default)]
    payload: Option<Value>,
  },
  Ping {
    #[serde(default)]
    payload: Option<Value>,
  },
  Pong {},
  Subscribe {
    id: String,
    payload: GraphQLRequest,
  },
  Complete {
    id: String,
  },
}

impl From<TransportWsClientFrame> for ClientMessage {
  fn from(frame: TransportWsClientFrame) -> Self {
    match frame {
      TransportWsClientFrame::ConnectionInit { payload } => ClientMessage::ConnectionInit { payload },
      TransportWsClientFrame::Ping { payload } => ClientMessage::Ping { payload },
      TransportWsClientFrame::Pong {} => ClientMessage::Pong,
      TransportWsClientFrame::Subscribe { id, payload } => ClientMessage::Subscribe { id, payload },
      TransportWsClientFrame::Complete { id } => ClientMessage::Complete { id },
    }
  }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TransportWsServerFrame<'a> {
  ConnectionAck,
  Ping,
  Pong {
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a Value>,
  },
  Next {
    id: &'a str,
    payload: &'a GraphQLResponse,
  },
  Error {
    id: &'a str,
    payload: &'a [GraphQLError],
  },
  Complete {
    id: &'a str,
  },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LegacyClientFrame {
  ConnectionInit {
    #[serde(default)]
    payload: Option<Value>,
  },
  Start {
    id: String,
    payload: GraphQLRequest,
  },
  Stop {
    id: String,
  },
  ConnectionTerminate,
}

impl From<LegacyClientFrame> for ClientMessage {
  fn from(frame: LegacyClientFrame) -> Self {
    match frame {
      LegacyClientFrame::ConnectionInit { payload } => ClientMessage::ConnectionInit { payload },
      LegacyClientFrame::Start { id, payload } => ClientMessage::Subscribe { id, payload },
      LegacyClientFrame::Stop { id } => ClientMessage::Complete { id },
      LegacyClientFrame::ConnectionTerminate => ClientMessage::Terminate,
    }
  }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LegacyServerFrame<'a> {
  ConnectionAck,
  ConnectionError {
    payload: GraphQLError,
  },
  Ka,
  Data {
    id: &'a str,
    payload: &'a GraphQLResponse,
  },
  Error {
    id: &'a str,
    payload: &'a [GraphQLError],
  },
  Complete {
    id: &'a str,
  },
}
