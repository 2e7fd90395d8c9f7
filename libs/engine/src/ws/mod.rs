pub mod connection;
pub mod liveness;
pub mod protocol;
pub mod writer;

pub use connection::{StreamingConnection, StreamingSettings};
pub use protocol::{CloseFrame, CloseReason, InboundFrame, OutboundFrame, WsProtocol};
