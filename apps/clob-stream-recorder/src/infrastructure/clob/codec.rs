//! Frame Codec
//!
//! Turns one WebSocket text frame into the logical messages it carries.
//!
//! The market channel sends most events as a single JSON object, but the
//! initial book snapshots arrive as a top-level array:
//!
//! ```json
//! [{"event_type":"book","asset_id":"A",...},{"event_type":"book","asset_id":"B",...}]
//! ```
//!
//! Arrays are unwrapped so each element is classified and persisted on its
//! own. An array is never persisted as a single record. Elements are split
//! as raw text so nothing is reformatted before classification.

use serde_json::value::RawValue;

use super::messages::ClassifiedMessage;

/// Keepalive request sent by the client.
pub const KEEPALIVE_PING: &str = "PING";

/// Keepalive echo sent by the server.
pub const KEEPALIVE_PONG: &str = "PONG";

/// JSON codec for market channel frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into zero or more classified messages.
    ///
    /// Never fails: undecodable text yields a single `Unknown` message, and
    /// an empty array yields none.
    #[must_use]
    pub fn decode_frame(&self, text: &str) -> Vec<ClassifiedMessage> {
        if text.trim_start().starts_with('[')
            && let Ok(items) = serde_json::from_str::<Vec<&RawValue>>(text)
        {
            return items
                .into_iter()
                .map(|item| ClassifiedMessage::from_text(item.get()))
                .collect();
        }
        vec![ClassifiedMessage::from_text(text)]
    }

    /// Decode a binary frame, interpreting the bytes as (lossy) UTF-8.
    #[must_use]
    pub fn decode_binary(&self, bytes: &[u8]) -> Vec<ClassifiedMessage> {
        self.decode_frame(&String::from_utf8_lossy(bytes))
    }

    /// Check whether a text frame is the server's keepalive echo.
    #[must_use]
    pub fn is_keepalive_echo(&self, text: &str) -> bool {
        text.trim().eq_ignore_ascii_case(KEEPALIVE_PONG)
    }
}
