use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::{Stream, StreamExt};
use switchboard_common::{
  graphql::{GraphQLError, GraphQLRequest, ParsedGraphQLRequest},
  origin::OriginAllowList,
};
use switchboard_config::WebSocketConfig;
use tokio::{
  sync::{mpsc, watch},
  task::JoinError,
  time::{sleep, timeout, Instant},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
  persisted_queries::PersistedQueryResolver,
  source::runtime::{SourceRuntime, SourceStream},
};

use super::{
  liveness::{LivenessMonitor, LivenessOutcome},
  protocol::{
    ClientMessage, CloseReason, InboundFrame, OutboundFrame, ProtocolError, ServerMessage,
    WsProtocol,
  },
  writer::{Disconnected, OutboundWriter},
};

/// Upper bound for operations to flush their last frames once the connection is closing.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct StreamingSettings {
  pub allowed_origins: OriginAllowList,
  pub keep_alive_interval: Duration,
  pub keep_alive_timeout: Duration,
  pub connection_init_wait_timeout: Duration,
}

impl From<&WebSocketConfig> for StreamingSettings {
  fn from(config: &WebSocketConfig) -> Self {
    Self {
      allowed_origins: OriginAllowList::new(config.allowed_origins.iter()),
      keep_alive_interval: config.keep_alive_interval,
      keep_alive_timeout: config.keep_alive_timeout,
      connection_init_wait_timeout: config.connection_init_wait_timeout,
    }
  }
}

#[derive(Debug)]
struct ActiveOperation {
  token: CancellationToken,
  generation: u64,
}

/// One upgraded streaming connection.
///
/// Inbound frames are demultiplexed by operation id, each operation runs in its own task with
/// a cancellation token derived from the connection one. Every outbound frame, heartbeats
/// included, goes through a single [`OutboundWriter`].
#[derive(Debug)]
pub struct StreamingConnection {
  protocol: WsProtocol,
  source: Arc<dyn SourceRuntime>,
  persisted_queries: Option<PersistedQueryResolver>,
  settings: StreamingSettings,
}

impl StreamingConnection {
  pub fn new(
    protocol: WsProtocol,
    source: Arc<dyn SourceRuntime>,
    persisted_queries: Option<PersistedQueryResolver>,
    settings: StreamingSettings,
  ) -> Self {
    Self {
      protocol,
      source,
      persisted_queries,
      settings,
    }
  }

  pub fn protocol(&self) -> WsProtocol {
    self.protocol
  }

  /// Drives the connection until it closes. The close frame, if any, is the last frame queued
  /// on `outbound`.
  #[tracing::instrument(level = "debug", skip_all, fields(protocol = self.protocol.name()))]
  pub async fn serve<S>(self, mut inbound: S, outbound: mpsc::Sender<OutboundFrame>) -> CloseReason
  where
    S: Stream<Item = InboundFrame> + Unpin,
  {
    let writer = OutboundWriter::new(self.protocol, outbound);
    let (acks, acks_rx) = watch::channel(Instant::now());
    let (finished_tx, mut finished) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();

    let mut monitor = LivenessMonitor::new(
      self.settings.keep_alive_interval,
      self.settings.keep_alive_timeout,
    )
    .spawn(writer.clone(), acks_rx, shutdown.clone());
    let mut monitor_finished = false;

    let init_deadline = sleep(self.settings.connection_init_wait_timeout);
    tokio::pin!(init_deadline);

    let mut state = ConnectionState {
      writer: writer.clone(),
      source: self.source,
      persisted_queries: self.persisted_queries,
      acks,
      finished: finished_tx,
      shutdown: shutdown.clone(),
      tracker: TaskTracker::new(),
      operations: HashMap::new(),
      next_generation: 0,
      initialized: false,
    };

    let reason = loop {
      tokio::select! {
        biased;

        Some((id, generation)) = finished.recv() => state.operation_finished(id, generation),
        outcome = &mut monitor, if !monitor_finished => {
          monitor_finished = true;

          if let Some(reason) = liveness_close_reason(outcome) {
            break reason;
          }
        }
        _ = &mut init_deadline, if !state.initialized => {
          debug!("connection_init not received in time");

          break CloseReason::InitTimeout;
        }
        frame = inbound.next() => {
          while let Ok((id, generation)) = finished.try_recv() {
            state.operation_finished(id, generation);
          }

          let frame = match frame {
            Some(frame) => frame,
            None => break CloseReason::Disconnected,
          };

          // Replies wait for room in the outbound queue, the monitor must still be able to
          // reap a peer that stopped reading meanwhile.
          let reason = tokio::select! {
            reason = state.handle_frame(frame) => reason,
            outcome = &mut monitor, if !monitor_finished => {
              monitor_finished = true;

              liveness_close_reason(outcome)
            }
          };

          if let Some(reason) = reason {
            break reason;
          }
        }
      }
    };

    info!(
      "closing streaming connection ({:?}), {} active operation(s)",
      reason,
      state.operations.len()
    );

    shutdown.cancel();
    state.tracker.close();

    if timeout(SHUTDOWN_GRACE, state.tracker.wait()).await.is_err() {
      warn!("operations did not stop within {:?}", SHUTDOWN_GRACE);
    }

    if !monitor_finished {
      let _ = monitor.await;
    }

    if reason != CloseReason::Disconnected
      && writer
        .send_frame_within(OutboundFrame::Close(reason.frame()), SHUTDOWN_GRACE)
        .await
        .is_err()
    {
      debug!("close frame dropped, the peer is not reading");
    }

    reason
  }
}

fn liveness_close_reason(outcome: Result<LivenessOutcome, JoinError>) -> Option<CloseReason> {
  match outcome {
    Ok(LivenessOutcome::PeerUnresponsive) => Some(CloseReason::HeartbeatTimeout),
    Ok(LivenessOutcome::Disconnected) => Some(CloseReason::Disconnected),
    Ok(LivenessOutcome::Stopped) => None,
    Err(e) => {
      warn!("liveness monitor failed: {}", e);
      None
    }
  }
}

struct ConnectionState {
  writer: OutboundWriter,
  source: Arc<dyn SourceRuntime>,
  persisted_queries: Option<PersistedQueryResolver>,
  acks: watch::Sender<Instant>,
  finished: mpsc::UnboundedSender<(String, u64)>,
  shutdown: CancellationToken,
  tracker: TaskTracker,
  operations: HashMap<String, ActiveOperation>,
  next_generation: u64,
  initialized: bool,
}

impl ConnectionState {
  async fn handle_frame(&mut self, frame: InboundFrame) -> Option<CloseReason> {
    match frame {
      InboundFrame::Text(text) => match self.writer.protocol().decode(&text) {
        Ok(message) => self.handle_message(message).await,
        Err(e) => self.report_protocol_error(e).await,
      },
      InboundFrame::Binary(_) => self.report_protocol_error(ProtocolError::BinaryMessage).await,
      InboundFrame::Ping(payload) => self
        .writer
        .send_frame(OutboundFrame::Pong(payload))
        .await
        .err()
        .map(|_| CloseReason::Disconnected),
      InboundFrame::Pong(_) => {
        self.acknowledge();
        None
      }
      InboundFrame::Close(frame) => Some(CloseReason::PeerClosed(frame)),
    }
  }

  async fn handle_message(&mut self, message: ClientMessage) -> Option<CloseReason> {
    let sent = match message {
      ClientMessage::ConnectionInit { .. } => {
        if self.initialized {
          return Some(CloseReason::TooManyInitRequests);
        }

        self.initialized = true;
        self.writer.send(ServerMessage::ConnectionAck).await
      }
      ClientMessage::Subscribe { id, payload } => {
        if !self.initialized {
          return Some(CloseReason::Unauthorized);
        }

        if self.operations.contains_key(&id) {
          let message = format!("Subscriber for {} already exists", id);

          self
            .writer
            .send(ServerMessage::Error {
              id,
              payload: vec![GraphQLError::with_code(&message, "BAD_REQUEST")],
            })
            .await
        } else {
          self.start_operation(id, payload).await
        }
      }
      ClientMessage::Complete { id } => {
        if let Some(operation) = self.operations.remove(&id) {
          debug!("operation {} cancelled by client", id);
          operation.token.cancel();
        }

        Ok(())
      }
      ClientMessage::Ping { payload } => self.writer.send(ServerMessage::Pong { payload }).await,
      ClientMessage::Pong => {
        self.acknowledge();
        Ok(())
      }
      ClientMessage::Terminate => return Some(CloseReason::Normal),
    };

    sent.err().map(|_| CloseReason::Disconnected)
  }

  async fn report_protocol_error(&mut self, error: ProtocolError) -> Option<CloseReason> {
    warn!("invalid streaming message: {}", error);

    let message = match error.operation_id() {
      Some(id) => ServerMessage::Error {
        id: id.to_string(),
        payload: vec![GraphQLError::with_code(&error.to_string(), "BAD_REQUEST")],
      },
      None => ServerMessage::ConnectionError {
        message: error.to_string(),
      },
    };

    self
      .writer
      .send(message)
      .await
      .err()
      .map(|_| CloseReason::Disconnected)
  }

  async fn start_operation(
    &mut self,
    id: String,
    mut request: GraphQLRequest,
  ) -> Result<(), Disconnected> {
    if let Some(resolver) = &self.persisted_queries {
      if let Err(e) = resolver.resolve(&mut request) {
        return self
          .writer
          .send(ServerMessage::Error {
            id,
            payload: vec![e.to_graphql_error()],
          })
          .await;
      }
    }

    let parsed = match ParsedGraphQLRequest::create_and_parse(request) {
      Ok(parsed) => parsed,
      Err(e) => {
        return self
          .writer
          .send(ServerMessage::Error {
            id,
            payload: vec![GraphQLError::with_code(
              &e.to_string(),
              "GRAPHQL_PARSE_FAILED",
            )],
          })
          .await;
      }
    };

    let token = self.shutdown.child_token();
    let generation = self.next_generation;
    self.next_generation += 1;

    debug!("starting operation {}", id);
    self.operations.insert(
      id.clone(),
      ActiveOperation {
        token: token.clone(),
        generation,
      },
    );

    let operation = OperationTask {
      id,
      generation,
      token,
      shutdown: self.shutdown.clone(),
      writer: self.writer.clone(),
      finished: self.finished.clone(),
    };
    let stream = self.source.clone().execute_stream(parsed);
    self.tracker.spawn(operation.run(stream));

    Ok(())
  }

  fn operation_finished(&mut self, id: String, generation: u64) {
    // The id may already belong to a newer operation.
    if self
      .operations
      .get(&id)
      .is_some_and(|operation| operation.generation == generation)
    {
      self.operations.remove(&id);
    }
  }

  fn acknowledge(&self) {
    self.acks.send_replace(Instant::now());
  }
}

struct OperationTask {
  id: String,
  generation: u64,
  token: CancellationToken,
  shutdown: CancellationToken,
  writer: OutboundWriter,
  finished: mpsc::UnboundedSender<(String, u64)>,
}

impl OperationTask {
  async fn run(self, mut stream: SourceStream) {
    loop {
      tokio::select! {
        biased;

        _ = self.token.cancelled() => {
          self.cancelled().await;
          break;
        }
        item = stream.next() => match item {
          Some(payload) => {
            let next = ServerMessage::Next {
              id: self.id.clone(),
              payload,
            };

            tokio::select! {
              biased;

              _ = self.token.cancelled() => {
                self.cancelled().await;
                break;
              }
              sent = self.writer.send(next) => if sent.is_err() {
                break;
              }
            }
          }
          None => {
            let complete = ServerMessage::Complete {
              id: self.id.clone(),
            };

            tokio::select! {
              biased;

              _ = self.token.cancelled() => self.cancelled().await,
              _ = self.writer.send(complete) => {}
            }

            break;
          }
        }
      }
    }

    let _ = self.finished.send((self.id, self.generation));
  }

  /// A client `complete` needs no answer, a closing connection tells every open id.
  async fn cancelled(&self) {
    if !self.shutdown.is_cancelled() {
      return;
    }

    let complete = ServerMessage::Complete {
      id: self.id.clone(),
    };

    if self.writer.send_within(complete, SHUTDOWN_GRACE).await.is_err() {
      debug!("cancellation notice for {} dropped", self.id);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::runtime::SourceFuture;
  use futures::stream;
  use serde_json::{json, Value};
  use switchboard_common::graphql::GraphQLResponse;
  use tokio::task::JoinHandle;

  #[derive(Debug)]
  struct TypenameSource;

  impl SourceRuntime for TypenameSource {
    fn execute<'a>(&'a self, _request: &'a ParsedGraphQLRequest) -> SourceFuture<'a> {
      Box::pin(async { Ok(GraphQLResponse::new_data(json!({ "__typename": "Query" }))) })
    }
  }

  /// Emits `{ "count": n }` every `period`, forever.
  #[derive(Debug)]
  struct CountingSource {
    period: Duration,
  }

  impl SourceRuntime for CountingSource {
    fn execute<'a>(&'a self, _request: &'a ParsedGraphQLRequest) -> SourceFuture<'a> {
      Box::pin(async { Ok(GraphQLResponse::new_data(json!({ "count": 0 }))) })
    }

    fn execute_stream(self: Arc<Self>, _request: ParsedGraphQLRequest) -> SourceStream {
      let period = self.period;

      Box::pin(stream::unfold(0u64, move |n| async move {
        sleep(period).await;

        Some((GraphQLResponse::new_data(json!({ "count": n })), n + 1))
      }))
    }
  }

  fn settings() -> StreamingSettings {
    StreamingSettings {
      allowed_origins: OriginAllowList::default(),
      keep_alive_interval: Duration::from_secs(60),
      keep_alive_timeout: Duration::from_secs(60),
      connection_init_wait_timeout: Duration::from_secs(3),
    }
  }

  struct Client {
    inbound: futures::channel::mpsc::UnboundedSender<InboundFrame>,
    outbound: mpsc::Receiver<OutboundFrame>,
    handle: JoinHandle<CloseReason>,
  }

  impl Client {
    fn connect(protocol: WsProtocol) -> Self {
      Self::connect_with(protocol, Arc::new(TypenameSource), 32, settings())
    }

    fn connect_with(
      protocol: WsProtocol,
      source: Arc<dyn SourceRuntime>,
      capacity: usize,
      settings: StreamingSettings,
    ) -> Self {
      let (inbound, inbound_rx) = futures::channel::mpsc::unbounded();
      let (outbound_tx, outbound) = mpsc::channel(capacity);
      let connection = StreamingConnection::new(protocol, source, None, settings);
      let handle = tokio::spawn(connection.serve(inbound_rx, outbound_tx));

      Self {
        inbound,
        outbound,
        handle,
      }
    }

    fn send(&self, message: Value) {
      self
        .inbound
        .unbounded_send(InboundFrame::Text(message.to_string()))
        .unwrap();
    }

    async fn recv(&mut self) -> Value {
      match self.outbound.recv().await {
        Some(OutboundFrame::Text(text)) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {:?}", other),
      }
    }

    async fn close_frame(&mut self) -> Option<u16> {
      loop {
        match self.outbound.recv().await {
          Some(OutboundFrame::Close(frame)) => return frame.map(|frame| frame.code),
          Some(_) => continue,
          None => panic!("connection ended without a close frame"),
        }
      }
    }
  }

  #[tokio::test]
  async fn subscribe_streams_next_then_complete() {
    let mut client = Client::connect(WsProtocol::GraphQLTransportWs);

    client.send(json!({ "type": "connection_init" }));
    assert_eq!(client.recv().await, json!({ "type": "connection_ack" }));

    client.send(json!({
      "type": "subscribe",
      "id": "1",
      "payload": { "query": "subscription { __typename }" }
    }));
    assert_eq!(
      client.recv().await,
      json!({ "type": "next", "id": "1", "payload": { "data": { "__typename": "Query" } } })
    );
    assert_eq!(client.recv().await, json!({ "type": "complete", "id": "1" }));
  }

  fn subscribe(id: &str) -> Value {
    json!({
      "type": "subscribe",
      "id": id,
      "payload": { "query": "subscription { count }" }
    })
  }

  #[tokio::test(start_paused = true)]
  async fn completing_one_id_leaves_the_others_running() {
    let mut client = Client::connect_with(
      WsProtocol::GraphQLTransportWs,
      Arc::new(CountingSource {
        period: Duration::from_secs(1),
      }),
      32,
      settings(),
    );

    client.send(json!({ "type": "connection_init" }));
    assert_eq!(client.recv().await, json!({ "type": "connection_ack" }));

    client.send(subscribe("a"));
    client.send(subscribe("b"));

    let mut first = vec![client.recv().await["id"].clone(), client.recv().await["id"].clone()];
    first.sort_by_key(|id| id.to_string());
    assert_eq!(first, vec![json!("a"), json!("b")]);

    client.send(json!({ "type": "complete", "id": "a" }));

    let mut counts = Vec::new();
    while counts.len() < 3 {
      let message = client.recv().await;

      assert_ne!(message, json!({ "type": "complete", "id": "a" }));
      if message["id"] == "b" {
        assert_eq!(message["type"], "next");
        counts.push(message["payload"]["data"]["count"].as_u64().unwrap());
      }
    }

    assert_eq!(counts, vec![1, 2, 3]);
    assert!(!client.handle.is_finished());
  }

  #[tokio::test(start_paused = true)]
  async fn peer_that_stops_reading_is_closed_by_heartbeat() {
    let settings = StreamingSettings {
      keep_alive_interval: Duration::from_secs(10),
      keep_alive_timeout: Duration::from_secs(5),
      ..settings()
    };
    let client = Client::connect_with(
      WsProtocol::GraphQLTransportWs,
      Arc::new(CountingSource {
        period: Duration::from_secs(1),
      }),
      4,
      settings,
    );
    let started = Instant::now();

    client.send(json!({ "type": "connection_init" }));
    client.send(subscribe("1"));

    // `client.outbound` is never drained.
    let reason = timeout(Duration::from_secs(120), client.handle)
      .await
      .expect("connection was never closed")
      .unwrap();

    assert_eq!(reason, CloseReason::HeartbeatTimeout);
    assert!(started.elapsed() >= Duration::from_secs(15));
    assert!(started.elapsed() < Duration::from_secs(20));
  }
}
