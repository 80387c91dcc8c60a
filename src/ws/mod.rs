//! WebSocket connection lifecycle: transport, heartbeat, state machine

pub mod connection;
pub mod heartbeat;
pub mod manager;

pub use connection::{Connector, LinkState, Transport, WebSocketConnection, WebSocketError, WsConnector};
pub use heartbeat::{HeartbeatProber, LatencySample, ProbeTick, PROBE_FRAME};
pub use manager::{Action, CloseReason, ConnectionManager, ConnectionState, Failure, RetryContext};
