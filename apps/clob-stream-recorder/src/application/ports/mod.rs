//! Port Interfaces
//!
//! Defines the interfaces (ports) that infrastructure adapters implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `RecordSink`: Durable, append-only storage for classified messages

use async_trait::async_trait;
use thiserror::Error;

use crate::infrastructure::clob::messages::InboundMessage;

/// Record store failures. Always fatal for the session.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Underlying I/O failed.
    #[error("record store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be serialized.
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The sink was used after `close`.
    #[error("record store is closed")]
    Closed,
}

/// Append-only destination for classified messages.
///
/// Records are written in call order, one per logical message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSink: Send {
    /// Append one record.
    async fn append(&mut self, record: &InboundMessage) -> Result<(), SinkError>;

    /// Push buffered records to the operating system.
    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Flush, sync to stable storage, and release the sink.
    async fn close(&mut self) -> Result<(), SinkError>;
}
