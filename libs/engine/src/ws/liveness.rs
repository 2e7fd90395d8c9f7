use std::time::Duration;

use tokio::{
  sync::watch,
  task::JoinHandle,
  time::{interval_at, timeout, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::writer::{Disconnected, OutboundWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessOutcome {
  /// A heartbeat was not acknowledged within the timeout.
  PeerUnresponsive,
  /// The outbound queue or the acknowledgement channel is gone.
  Disconnected,
  /// The connection shut down for another reason.
  Stopped,
}

/// Periodic heartbeat of one streaming connection.
///
/// Every `interval` the protocol heartbeat is queued on the connection writer and an
/// acknowledgement is awaited, both within `timeout`. Acknowledgements are published by the
/// connection on a `watch` channel as the instant they were received.
#[derive(Debug, Clone, Copy)]
pub struct LivenessMonitor {
  pub interval: Duration,
  pub timeout: Duration,
}

impl LivenessMonitor {
  pub fn new(interval: Duration, timeout: Duration) -> Self {
    Self { interval, timeout }
  }

  pub fn spawn(
    self,
    writer: OutboundWriter,
    acks: watch::Receiver<Instant>,
    shutdown: CancellationToken,
  ) -> JoinHandle<LivenessOutcome> {
    tokio::spawn(self.run(writer, acks, shutdown))
  }

  async fn run(
    self,
    writer: OutboundWriter,
    mut acks: watch::Receiver<Instant>,
    shutdown: CancellationToken,
  ) -> LivenessOutcome {
    let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = shutdown.cancelled() => return LivenessOutcome::Stopped,
        _ = ticker.tick() => {}
      }

      // Only acknowledgements received after this heartbeat count.
      acks.borrow_and_update();
      let sent_at = Instant::now();

      // The deadline covers queueing as well: a peer that stopped reading leaves no room.
      let heartbeat = async {
        writer.send_frames(writer.protocol().heartbeat()).await?;
        acks.changed().await.map_err(|_| Disconnected)
      };

      tokio::select! {
        _ = shutdown.cancelled() => return LivenessOutcome::Stopped,
        result = timeout(self.timeout, heartbeat) => match result {
          Ok(Ok(())) => {
            debug!("heartbeat acknowledged after {:?}", acks.borrow().saturating_duration_since(sent_at));
          }
          Ok(Err(Disconnected)) => return LivenessOutcome::Disconnected,
          Err(_) => {
            warn!("heartbeat not acknowledged within {:?}, closing connection", self.timeout);

            return LivenessOutcome::PeerUnresponsive;
          }
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ws::protocol::{OutboundFrame, WsProtocol};
  use tokio::sync::mpsc;

  fn monitor_parts() -> (
    OutboundWriter,
    mpsc::Receiver<OutboundFrame>,
    watch::Sender<Instant>,
    watch::Receiver<Instant>,
  ) {
    let (tx, rx) = mpsc::channel(16);
    let (acks_tx, acks_rx) = watch::channel(Instant::now());

    (
      OutboundWriter::new(WsProtocol::GraphQLTransportWs, tx),
      rx,
      acks_tx,
      acks_rx,
    )
  }

  #[tokio::test(start_paused = true)]
  async fn unacknowledged_heartbeat_is_reported() {
    let (writer, mut frames, _acks_tx, acks_rx) = monitor_parts();
    let started = Instant::now();
    let handle = LivenessMonitor::new(Duration::from_secs(10), Duration::from_secs(5)).spawn(
      writer,
      acks_rx,
      CancellationToken::new(),
    );

    assert_eq!(handle.await.unwrap(), LivenessOutcome::PeerUnresponsive);
    assert_eq!(
      frames.recv().await,
      Some(OutboundFrame::Text(r#"{"type":"ping"}"#.to_string()))
    );
    assert!(started.elapsed() >= Duration::from_secs(15));
    assert!(started.elapsed() < Duration::from_secs(16));
  }

  #[tokio::test(start_paused = true)]
  async fn acknowledged_heartbeats_keep_the_connection() {
    let (writer, mut frames, acks_tx, acks_rx) = monitor_parts();
    let shutdown = CancellationToken::new();
    let handle = LivenessMonitor::new(Duration::from_secs(10), Duration::from_secs(5)).spawn(
      writer,
      acks_rx,
      shutdown.clone(),
    );

    for _ in 0..3 {
      assert!(matches!(frames.recv().await, Some(OutboundFrame::Text(_))));
      acks_tx.send_replace(Instant::now());
    }

    shutdown.cancel();

    assert_eq!(handle.await.unwrap(), LivenessOutcome::Stopped);
  }

  #[tokio::test(start_paused = true)]
  async fn full_queue_counts_as_unresponsive() {
    let (tx, _frames) = mpsc::channel(1);
    let (_acks_tx, acks_rx) = watch::channel(Instant::now());
    tx.send(OutboundFrame::Text("{}".to_string())).await.unwrap();

    let started = Instant::now();
    let handle = LivenessMonitor::new(Duration::from_secs(10), Duration::from_secs(5)).spawn(
      OutboundWriter::new(WsProtocol::GraphQLTransportWs, tx),
      acks_rx,
      CancellationToken::new(),
    );

    assert_eq!(handle.await.unwrap(), LivenessOutcome::PeerUnresponsive);
    assert!(started.elapsed() < Duration::from_secs(16));
  }
}
