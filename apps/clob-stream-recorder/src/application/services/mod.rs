//! Application Services
//!
//! `FrameIngestor` is the single path from a received frame to the record
//! store and the session counters: unwrap, classify, append, count.

use std::sync::Arc;

use chrono::Utc;

use crate::application::ports::{RecordSink, SinkError};
use crate::domain::stats::StatsTracker;
use crate::infrastructure::clob::codec::JsonCodec;
use crate::infrastructure::clob::messages::{ClassifiedMessage, InboundMessage};
use crate::infrastructure::metrics;

/// Turns frames into persisted, counted records.
#[derive(Debug)]
pub struct FrameIngestor {
    codec: JsonCodec,
    stats: Arc<StatsTracker>,
    next_seq: u64,
}

impl FrameIngestor {
    /// Create an ingestor feeding the given counters.
    #[must_use]
    pub const fn new(stats: Arc<StatsTracker>) -> Self {
        Self {
            codec: JsonCodec::new(),
            stats,
            next_seq: 1,
        }
    }

    /// Ingest one text frame.
    ///
    /// Returns the number of logical messages the frame carried.
    ///
    /// # Errors
    ///
    /// Returns the first sink failure; messages after it are not counted.
    pub async fn ingest_text(
        &mut self,
        text: &str,
        sink: &mut dyn RecordSink,
    ) -> Result<usize, SinkError> {
        let messages = self.codec.decode_frame(text);
        self.ingest(messages, sink).await
    }

    /// Ingest one binary frame as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns the first sink failure.
    pub async fn ingest_binary(
        &mut self,
        bytes: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<usize, SinkError> {
        let messages = self.codec.decode_binary(bytes);
        self.ingest(messages, sink).await
    }

    async fn ingest(
        &mut self,
        messages: Vec<ClassifiedMessage>,
        sink: &mut dyn RecordSink,
    ) -> Result<usize, SinkError> {
        let count = messages.len();
        for message in messages {
            let kind = message.kind();
            let record = InboundMessage {
                seq: self.next_seq,
                received_at: Utc::now(),
                message,
            };

            sink.append(&record).await?;
            self.next_seq += 1;

            self.stats.record_received_at(kind, record.received_at);
            metrics::record_message_received(kind);
            if !kind.is_known() {
                tracing::debug!(seq = record.seq, "Unclassified message recorded");
            }
        }
        Ok(count)
    }

    /// Sequence number the next record will get.
    #[must_use]
    pub const fn next_seq(&self) -> u64 {
        self.next_seq
    }
}
