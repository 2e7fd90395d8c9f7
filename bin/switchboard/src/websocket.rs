use actix_web::{
  http::header::{HeaderName, HeaderValue},
  web, HttpRequest, HttpResponse,
};
use actix_ws::{CloseCode, Message, Session};
use futures_util::{future::ready, StreamExt};
use switchboard_engine::ws::{CloseFrame, InboundFrame, OutboundFrame, StreamingConnection};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};
use ulid::Ulid;

const OUTBOUND_QUEUE_SIZE: usize = 64;

/// Completes the handshake and hands the socket over to the streaming connection.
pub fn upgrade(
  req: &HttpRequest,
  payload: web::Payload,
  connection: StreamingConnection,
) -> HttpResponse {
  let protocol = connection.protocol();
  let (mut response, session, messages) = match actix_ws::handle(req, payload) {
    Ok(handshake) => handshake,
    Err(e) => {
      warn!("websocket handshake failed: {}", e);

      return HttpResponse::from_error(e);
    }
  };

  // Answering with a subprotocol the client did not offer fails the handshake.
  let protocol_header = HeaderName::from_static("sec-websocket-protocol");
  if req.headers().contains_key(&protocol_header) {
    response
      .headers_mut()
      .insert(protocol_header, HeaderValue::from_static(protocol.name()));
  }

  let connection_id = Ulid::new();
  let span = tracing::info_span!("streaming_connection", id = %connection_id, protocol = protocol.name());
  let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);

  let inbound = messages
    .take_while(|message| {
      if let Err(e) = message {
        warn!("websocket protocol error: {}", e);
      }

      ready(message.is_ok())
    })
    .filter_map(|message| ready(message.ok().and_then(into_inbound_frame)));

  actix_web::rt::spawn(write_frames(session, outbound_rx).instrument(span.clone()));
  actix_web::rt::spawn(
    async move {
      let reason = connection.serve(Box::pin(inbound), outbound).await;
      info!("streaming connection closed: {:?}", reason);
    }
    .instrument(span),
  );

  response
}

fn into_inbound_frame(message: Message) -> Option<InboundFrame> {
  match message {
    Message::Text(text) => Some(InboundFrame::Text(text.to_string())),
    Message::Binary(bytes) => Some(InboundFrame::Binary(bytes)),
    Message::Ping(bytes) => Some(InboundFrame::Ping(bytes)),
    Message::Pong(bytes) => Some(InboundFrame::Pong(bytes)),
    Message::Close(reason) => Some(InboundFrame::Close(reason.map(|reason| {
      CloseFrame::new(reason.code.into(), reason.description.unwrap_or_default())
    }))),
    Message::Continuation(_) => {
      debug!("fragmented websocket messages are not supported, dropping frame");
      None
    }
    Message::Nop => None,
  }
}

/// Drains the connection queue into the socket. A close frame ends the session.
async fn write_frames(mut session: Session, mut frames: mpsc::Receiver<OutboundFrame>) {
  while let Some(frame) = frames.recv().await {
    let sent = match frame {
      OutboundFrame::Text(text) => session.text(text).await,
      OutboundFrame::Ping(bytes) => session.ping(&bytes).await,
      OutboundFrame::Pong(bytes) => session.pong(&bytes).await,
      OutboundFrame::Close(frame) => {
        let reason = frame.map(|frame| actix_ws::CloseReason {
          code: CloseCode::from(frame.code),
          description: Some(frame.reason).filter(|reason| !reason.is_empty()),
        });
        let _ = session.close(reason).await;

        return;
      }
    };

    if sent.is_err() {
      debug!("websocket session is closed, dropping outbound frames");

      return;
    }
  }

  let _ = session.close(None).await;
}
