use std::time::Duration;

use tokio::sync::mpsc;

use super::protocol::{OutboundFrame, ServerMessage, WsProtocol};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("streaming connection is closed")]
pub struct Disconnected;

/// The single outbound path of a streaming connection.
///
/// Operation results, heartbeats and protocol replies are all queued here, so frames
/// produced by one operation keep their order on the wire.
#[derive(Debug, Clone)]
pub struct OutboundWriter {
  protocol: WsProtocol,
  sender: mpsc::Sender<OutboundFrame>,
}

impl OutboundWriter {
  pub fn new(protocol: WsProtocol, sender: mpsc::Sender<OutboundFrame>) -> Self {
    Self { protocol, sender }
  }

  pub fn protocol(&self) -> WsProtocol {
    self.protocol
  }

  /// Encodes and queues a message. Messages the protocol has no encoding for are skipped.
  pub async fn send(&self, message: ServerMessage) -> Result<(), Disconnected> {
    match self.protocol.encode(&message) {
      Some(text) => self.send_frame(OutboundFrame::Text(text)).await,
      None => Ok(()),
    }
  }

  pub async fn send_frame(&self, frame: OutboundFrame) -> Result<(), Disconnected> {
    self.sender.send(frame).await.map_err(|_| Disconnected)
  }

  /// Like [`OutboundWriter::send_frame`], but gives up once `limit` elapses without room in
  /// the queue. A peer that stopped reading counts as gone.
  pub async fn send_frame_within(
    &self,
    frame: OutboundFrame,
    limit: Duration,
  ) -> Result<(), Disconnected> {
    self
      .sender
      .send_timeout(frame, limit)
      .await
      .map_err(|_| Disconnected)
  }

  pub async fn send_within(
    &self,
    message: ServerMessage,
    limit: Duration,
  ) -> Result<(), Disconnected> {
    match self.protocol.encode(&message) {
      Some(text) => self.send_frame_within(OutboundFrame::Text(text), limit).await,
      None => Ok(()),
    }
  }

  pub async fn send_frames(
    &self,
    frames: impl IntoIterator<Item = OutboundFrame>,
  ) -> Result<(), Disconnected> {
    for frame in frames {
      self.send_frame(frame).await?;
    }

    Ok(())
  }
}
