//! CLOB WebSocket Adapters
//!
//! Client for the CLOB market channel:
//!
//! - **messages**: Typed event payloads and the classifier
//! - **codec**: Frame unwrapping and keepalive text
//! - **subscription**: Subscribe payloads for the market and user channels
//! - **heartbeat**: `PING` scheduling and silence detection
//! - **reconnect**: Exponential backoff with jitter
//! - **market**: Connection state machine and session loop

pub mod auth;
pub mod codec;
pub mod heartbeat;
pub mod market;
pub mod messages;
pub mod reconnect;
pub mod subscription;

pub use auth::AuthMaterial;
pub use codec::{JsonCodec, KEEPALIVE_PING, KEEPALIVE_PONG};
pub use heartbeat::{KeepaliveConfig, KeepaliveEvent, KeepaliveManager, LivenessState};
pub use market::{
    MarketStreamClient, MarketStreamConfig, SessionSummary, StopReason, StreamClientError,
    SubscriptionCommand, SubscriptionHandle,
};
pub use messages::{ClassifiedMessage, InboundMessage, UnknownMessage, UnknownReason};
pub use reconnect::{BackoffConfig, BackoffPolicy};
pub use subscription::{ChannelKind, ProtocolError, SubscriptionOperation, SubscriptionProtocol};
