//! CLOB Market Channel Message Types
//!
//! Wire format types for the market channel and the classifier that maps
//! frame text onto them.
//!
//! # Message Types
//!
//! ## Always delivered
//! - `book`: Full order book snapshot
//! - `price_change`: Incremental level changes
//! - `tick_size_change`: Minimum tick size change
//! - `last_trade_price`: Trade print
//!
//! ## Feature-flagged (`custom_feature_enabled`)
//! - `best_bid_ask`: Top of book update
//! - `new_market`: Market creation
//! - `market_resolved`: Market resolution
//!
//! Anything else becomes [`ClassifiedMessage::Unknown`] with the raw payload
//! preserved, key order and number spelling included. Prices, sizes, timestamps and similar fields arrive as either
//! JSON strings or JSON numbers and are always kept as strings.
//!
//! # References
//!
//! - [Market Channel](https://docs.polymarket.com/developers/CLOB/websocket/market-channel)

use chrono::{DateTime, Utc};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::streaming::EventKind;

/// Name of the discriminator field on every market channel event.
pub const EVENT_TYPE_FIELD: &str = "event_type";

// =============================================================================
// Book
// =============================================================================

/// One price level of an order book side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLevel {
    /// Level price.
    #[serde(deserialize_with = "string_or_number")]
    pub price: String,

    /// Resting size at this price.
    #[serde(deserialize_with = "string_or_number")]
    pub size: String,

    /// Unrecognized fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Full order book snapshot for one asset.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "event_type": "book",
///   "asset_id": "6581861...",
///   "market": "0xbd31dc8a...",
///   "timestamp": "1757908892351",
///   "hash": "0x1f2e...",
///   "bids": [{"price": "0.48", "size": "30"}],
///   "asks": [{"price": "0.52", "size": "25"}]
/// }
/// ```
///
/// Older payloads name the sides `buys` and `sells`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMessage {
    /// Asset (token) id.
    pub asset_id: String,

    /// Market condition id.
    pub market: String,

    /// Exchange timestamp in milliseconds.
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,

    /// Order book content hash.
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub hash: Option<String>,

    /// Bid levels.
    #[serde(default, alias = "buys")]
    pub bids: Vec<OrderLevel>,

    /// Ask levels.
    #[serde(default, alias = "sells")]
    pub asks: Vec<OrderLevel>,

    /// Unrecognized fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Price Change
// =============================================================================

/// One changed level inside a `price_change` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChangeEntry {
    /// Asset (token) id.
    pub asset_id: String,

    /// Level price.
    #[serde(deserialize_with = "string_or_number")]
    pub price: String,

    /// New size at this level.
    #[serde(deserialize_with = "string_or_number")]
    pub size: String,

    /// Book side (`BUY` / `SELL`).
    pub side: String,

    /// Order book hash after the change.
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub hash: Option<String>,

    /// Best bid after the change.
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub best_bid: Option<String>,

    /// Best ask after the change.
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub best_ask: Option<String>,

    /// Unrecognized fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Incremental order book changes.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "event_type": "price_change",
///   "market": "0x5f65177b...",
///   "timestamp": "1757908892351",
///   "price_changes": [
///     {"asset_id": "7145...", "price": "0.5", "size": "200", "side": "BUY",
///      "hash": "56621a12...", "best_bid": "0.5", "best_ask": "1"}
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChangeMessage {
    /// Market condition id.
    pub market: String,

    /// Exchange timestamp in milliseconds.
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,

    /// Changed levels.
    #[serde(default)]
    pub price_changes: Vec<PriceChangeEntry>,

    /// Unrecognized fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Tick Size Change / Last Trade Price / Best Bid Ask
// =============================================================================

/// Minimum tick size change.
///
/// # Wire Format (JSON)
/// ```json
/// {"event_type": "tick_size_change", "asset_id": "6581...", "market": "0xbd31...",
///  "old_tick_size": "0.01", "new_tick_size": "0.001", "timestamp": "100000000"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSizeChangeMessage {
    /// Asset (token) id.
    pub asset_id: String,

    /// Market condition id.
    pub market: String,

    /// Previous tick size.
    #[serde(deserialize_with = "string_or_number")]
    pub old_tick_size: String,

    /// New tick size.
    #[serde(deserialize_with = "string_or_number")]
    pub new_tick_size: String,

    /// Exchange timestamp in milliseconds.
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,

    /// Side indicator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,

    /// Unrecognized fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Trade print.
///
/// # Wire Format (JSON)
/// ```json
/// {"event_type": "last_trade_price", "asset_id": "1141...", "market": "0x6a67...",
///  "price": "0.456", "size": "219.217767", "side": "BUY",
///  "fee_rate_bps": "0", "timestamp": "1750428146322"}
/// ```
///
/// `fee_rate_bps` is sent as a string by some servers and a number by others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastTradePriceMessage {
    /// Asset (token) id.
    pub asset_id: String,

    /// Market condition id.
    pub market: String,

    /// Trade price.
    #[serde(deserialize_with = "string_or_number")]
    pub price: String,

    /// Trade size.
    #[serde(deserialize_with = "string_or_number")]
    pub size: String,

    /// Aggressor side (`BUY` / `SELL`).
    pub side: String,

    /// Exchange timestamp in milliseconds.
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,

    /// Fee rate in basis points.
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub fee_rate_bps: Option<String>,

    /// Unrecognized fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Top of book update.
///
/// # Wire Format (JSON)
/// ```json
/// {"event_type": "best_bid_ask", "asset_id": "8714...", "market": "0x0005...",
///  "best_bid": "0.73", "best_ask": "0.77", "spread": "0.04", "timestamp": "1766789469958"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestBidAskMessage {
    /// Asset (token) id.
    pub asset_id: String,

    /// Market condition id.
    pub market: String,

    /// Best bid price.
    #[serde(deserialize_with = "string_or_number")]
    pub best_bid: String,

    /// Best ask price.
    #[serde(deserialize_with = "string_or_number")]
    pub best_ask: String,

    /// Exchange timestamp in milliseconds.
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,

    /// Ask minus bid.
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub spread: Option<String>,

    /// Unrecognized fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Market Lifecycle
// =============================================================================

/// Market creation.
///
/// Only `market` is contractual; everything else is best effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMarketMessage {
    /// Market condition id.
    pub market: String,

    /// Market id.
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,

    /// Market question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,

    /// Market slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    /// Asset ids of the market outcomes.
    #[serde(
        default,
        deserialize_with = "string_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub assets_ids: Vec<String>,

    /// Outcome names.
    #[serde(
        default,
        deserialize_with = "string_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub outcomes: Vec<String>,

    /// Exchange timestamp in milliseconds.
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,

    /// Unrecognized fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Market resolution.
///
/// Only `market` is contractual; everything else is best effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketResolvedMessage {
    /// Market condition id.
    pub market: String,

    /// Market id.
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,

    /// Market question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,

    /// Market slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    /// Asset ids of the market outcomes.
    #[serde(
        default,
        deserialize_with = "string_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub assets_ids: Vec<String>,

    /// Outcome names.
    #[serde(
        default,
        deserialize_with = "string_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub outcomes: Vec<String>,

    /// Asset id of the winning outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_asset_id: Option<String>,

    /// Name of the winning outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_outcome: Option<String>,

    /// Exchange timestamp in milliseconds.
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,

    /// Unrecognized fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Unknown
// =============================================================================

/// Why a payload could not be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownReason {
    /// The frame was not valid JSON.
    InvalidJson,
    /// Valid JSON, but not an object.
    NotAnObject,
    /// Object without an `event_type` string.
    MissingEventType,
    /// `event_type` is not one of the known variants.
    UnrecognizedEventType,
    /// Known `event_type`, but required fields are absent or mistyped.
    MalformedFields,
}

/// Payload that did not match any known variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnknownMessage {
    /// Why classification failed.
    pub reason: UnknownReason,

    /// The payload exactly as received. Non-JSON text is kept as a JSON string.
    pub raw: Value,
}

// =============================================================================
// Classified Message
// =============================================================================

/// A single logical market channel message.
///
/// Serializes back to the wire shape with `event_type` first; unknown
/// payloads serialize as `{"event_type":"unknown","reason":...,"raw":...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ClassifiedMessage {
    /// Order book snapshot.
    Book(BookMessage),
    /// Level changes.
    PriceChange(PriceChangeMessage),
    /// Tick size change.
    TickSizeChange(TickSizeChangeMessage),
    /// Trade print.
    LastTradePrice(LastTradePriceMessage),
    /// Top of book.
    BestBidAsk(BestBidAskMessage),
    /// Market creation.
    NewMarket(NewMarketMessage),
    /// Market resolution.
    MarketResolved(MarketResolvedMessage),
    /// Unclassified payload.
    Unknown(UnknownMessage),
}

impl ClassifiedMessage {
    /// Classify raw frame text.
    ///
    /// Text that is not valid JSON becomes `Unknown(InvalidJson)`. Known
    /// variants are decoded from the text itself so numbers keep their wire
    /// spelling.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return Self::unknown(UnknownReason::InvalidJson, Value::String(text.to_owned()));
        };

        let Some(object) = value.as_object() else {
            return Self::unknown(UnknownReason::NotAnObject, value);
        };
        let Some(event_type) = object.get(EVENT_TYPE_FIELD).and_then(Value::as_str) else {
            return Self::unknown(UnknownReason::MissingEventType, value);
        };
        let Some(kind) = EventKind::from_event_type(event_type) else {
            return Self::unknown(UnknownReason::UnrecognizedEventType, value);
        };

        let decoded = match kind {
            EventKind::Book => decode(text).map(Self::Book),
            EventKind::PriceChange => decode(text).map(Self::PriceChange),
            EventKind::TickSizeChange => decode(text).map(Self::TickSizeChange),
            EventKind::LastTradePrice => decode(text).map(Self::LastTradePrice),
            EventKind::BestBidAsk => decode(text).map(Self::BestBidAsk),
            EventKind::NewMarket => decode(text).map(Self::NewMarket),
            EventKind::MarketResolved => decode(text).map(Self::MarketResolved),
            EventKind::Unknown { .. } => None,
        };

        decoded.unwrap_or_else(|| Self::unknown(UnknownReason::MalformedFields, value))
    }

    fn unknown(reason: UnknownReason, raw: Value) -> Self {
        Self::Unknown(UnknownMessage { reason, raw })
    }

    /// Classification outcome used for counters.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Book(_) => EventKind::Book,
            Self::PriceChange(_) => EventKind::PriceChange,
            Self::TickSizeChange(_) => EventKind::TickSizeChange,
            Self::LastTradePrice(_) => EventKind::LastTradePrice,
            Self::BestBidAsk(_) => EventKind::BestBidAsk,
            Self::NewMarket(_) => EventKind::NewMarket,
            Self::MarketResolved(_) => EventKind::MarketResolved,
            Self::Unknown(unknown) => EventKind::Unknown {
                undecodable: unknown.reason == UnknownReason::InvalidJson,
            },
        }
    }

    /// Event type label (`unknown` for unclassified payloads).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.kind().label()
    }

    /// Check if this message fell back to `Unknown`.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

/// Decode a known variant from frame text.
///
/// The discriminator lands in the flattened `extra` map and is stripped there
/// without disturbing the order of the remaining fields.
fn decode<T>(text: &str) -> Option<T>
where
    T: DeserializeOwned + HasExtra,
{
    let mut message = serde_json::from_str::<T>(text).ok()?;
    message.extra_mut().shift_remove(EVENT_TYPE_FIELD);
    Some(message)
}

/// Access to the flattened unrecognized-field map.
trait HasExtra {
    fn extra_mut(&mut self) -> &mut Map<String, Value>;
}

macro_rules! impl_has_extra {
    ($($ty:ty),* $(,)?) => {
        $(impl HasExtra for $ty {
            fn extra_mut(&mut self) -> &mut Map<String, Value> {
                &mut self.extra
            }
        })*
    };
}

impl_has_extra!(
    BookMessage,
    PriceChangeMessage,
    TickSizeChangeMessage,
    LastTradePriceMessage,
    BestBidAskMessage,
    NewMarketMessage,
    MarketResolvedMessage,
);

// =============================================================================
// Inbound Record
// =============================================================================

/// A classified message stamped with its arrival order and receive time.
///
/// # Record Format (JSONL)
/// ```json
/// {"seq":1,"received_at":"2025-01-01T00:00:00.000000Z","message":{"event_type":"book",...}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundMessage {
    /// 1-based arrival sequence within the process.
    pub seq: u64,

    /// Local receive time.
    pub received_at: DateTime<Utc>,

    /// The classified payload.
    pub message: ClassifiedMessage,
}

// =============================================================================
// Numbers-as-strings
// =============================================================================

/// Accept a JSON string or number, keeping the textual form.
///
/// Numbers are read with their source text intact (`10.50` stays `10.50`,
/// integers wider than 64 bits are not rounded).
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    opt_string_or_number(deserializer)?
        .ok_or_else(|| de::Error::custom("expected a string or a number, got null"))
}

/// Optional variant of [`string_or_number`]; `null` maps to `None`.
fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Null => Ok(None),
        other => Err(de::Error::custom(format!(
            "expected a string or a number, got {other}"
        ))),
    }
}

/// Accept a list of strings, or a string holding a JSON-encoded list.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(encoded) => serde_json::from_str(&encoded).map_err(de::Error::custom),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(de::Error::custom(format!("expected string item, got {other}"))),
            })
            .collect(),
        other => Err(de::Error::custom(format!("expected a list, got {other}"))),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use test_case::test_case;

    fn classify(value: Value) -> ClassifiedMessage {
        ClassifiedMessage::from_text(&value.to_string())
    }

    #[test]
    fn classifies_book_with_string_fields() {
        let msg = ClassifiedMessage::from_text(
            r#"{"event_type":"book","asset_id":"A1","market":"0xm","timestamp":"1757908892351",
                "hash":"0xh","bids":[{"price":"0.48","size":"30"}],"asks":[{"price":"0.52","size":"25"}]}"#,
        );

        let ClassifiedMessage::Book(book) = msg else {
            panic!("expected book, got {msg:?}");
        };
        assert_eq!(book.asset_id, "A1");
        assert_eq!(book.timestamp, "1757908892351");
        assert_eq!(book.hash.as_deref(), Some("0xh"));
        assert_eq!(book.bids[0].price, "0.48");
        assert_eq!(book.asks[0].size, "25");
        assert!(book.extra.is_empty());
    }

    #[test]
    fn book_accepts_buys_and_sells() {
        let msg = classify(json!({
            "event_type": "book", "asset_id": "A1", "market": "M", "timestamp": 1,
            "buys": [{"price": "0.1", "size": "5"}], "sells": []
        }));
        let ClassifiedMessage::Book(book) = msg else {
            panic!("expected book");
        };
        assert_eq!(book.bids.len(), 1);
        assert!(book.asks.is_empty());
        assert_eq!(book.timestamp, "1");
    }

    #[test]
    fn preserves_string_values_exactly() {
        let msg = classify(json!({
            "event_type": "last_trade_price", "asset_id": "A", "market": "M",
            "price": "0.4560", "size": "219.217767", "side": "BUY", "timestamp": "0001"
        }));
        let ClassifiedMessage::LastTradePrice(trade) = msg else {
            panic!("expected last trade");
        };
        assert_eq!(trade.price, "0.4560");
        assert_eq!(trade.size, "219.217767");
        assert_eq!(trade.timestamp, "0001");
    }

    #[test_case(json!("0") ; "string")]
    #[test_case(json!(0) ; "number")]
    fn fee_rate_bps_normalizes_to_string(fee: Value) {
        let msg = classify(json!({
            "event_type": "last_trade_price", "asset_id": "A", "market": "M",
            "price": "0.5", "size": "10", "side": "SELL", "timestamp": "1",
            "fee_rate_bps": fee
        }));
        let ClassifiedMessage::LastTradePrice(trade) = msg else {
            panic!("expected last trade");
        };
        assert_eq!(trade.fee_rate_bps.as_deref(), Some("0"));
    }

    #[test_case(json!({"event_type":"book","asset_id":"A","market":"M","timestamp":"1"}), EventKind::Book)]
    #[test_case(json!({"event_type":"price_change","market":"M","timestamp":"1","price_changes":[{"asset_id":"A","price":"0.5","size":"200","side":"BUY","best_bid":"0.5","best_ask":"1"}]}), EventKind::PriceChange)]
    #[test_case(json!({"event_type":"tick_size_change","asset_id":"A","market":"M","old_tick_size":"0.01","new_tick_size":"0.001","timestamp":"1"}), EventKind::TickSizeChange)]
    #[test_case(json!({"event_type":"last_trade_price","asset_id":"A","market":"M","price":"0.5","size":"1","side":"BUY","timestamp":"1"}), EventKind::LastTradePrice)]
    #[test_case(json!({"event_type":"best_bid_ask","asset_id":"A","market":"M","best_bid":"0.73","best_ask":"0.77","spread":"0.04","timestamp":"1"}), EventKind::BestBidAsk)]
    #[test_case(json!({"event_type":"new_market","market":"M","question":"Will it?","assets_ids":["A","B"],"outcomes":["Yes","No"]}), EventKind::NewMarket)]
    #[test_case(json!({"event_type":"market_resolved","market":"M","winning_asset_id":"A","winning_outcome":"Yes"}), EventKind::MarketResolved)]
    fn classifies_known_variants(value: Value, expected: EventKind) {
        let msg = classify(value);
        assert_eq!(msg.kind(), expected);
        assert!(!msg.is_unknown());
    }

    #[test_case("not json", UnknownReason::InvalidJson ; "garbage")]
    #[test_case("42", UnknownReason::NotAnObject ; "number")]
    #[test_case(r#"{"market":"M"}"#, UnknownReason::MissingEventType ; "no event type")]
    #[test_case(r#"{"event_type":7}"#, UnknownReason::MissingEventType ; "non string event type")]
    #[test_case(r#"{"event_type":"trade","id":"x"}"#, UnknownReason::UnrecognizedEventType ; "user event")]
    #[test_case(r#"{"event_type":"book","market":"M"}"#, UnknownReason::MalformedFields ; "book missing asset")]
    #[test_case(r#"{"event_type":"last_trade_price","asset_id":"A","market":"M","price":true,"size":"1","side":"BUY","timestamp":"1"}"#, UnknownReason::MalformedFields ; "bool price")]
    #[test_case(r#"{"event_type":"best_bid_ask","asset_id":"A","market":"M","best_bid":null,"best_ask":"1","timestamp":"1"}"#, UnknownReason::MalformedFields ; "null required")]
    fn falls_back_to_unknown(text: &str, reason: UnknownReason) {
        let msg = ClassifiedMessage::from_text(text);
        let ClassifiedMessage::Unknown(unknown) = &msg else {
            panic!("expected unknown, got {msg:?}");
        };
        assert_eq!(unknown.reason, reason);
        assert_eq!(
            msg.kind(),
            EventKind::Unknown { undecodable: reason == UnknownReason::InvalidJson }
        );
    }

    #[test]
    fn numbers_keep_their_wire_spelling() {
        let msg = ClassifiedMessage::from_text(
            r#"{"event_type":"last_trade_price","asset_id":"A","market":"M",
                "price":0.12345678901234567891,"size":10.50,"side":"BUY",
                "timestamp":1750428146322,"fee_rate_bps":123456789012345678901234567890}"#,
        );
        let ClassifiedMessage::LastTradePrice(trade) = msg else {
            panic!("expected last trade, got {msg:?}");
        };
        assert_eq!(trade.price, "0.12345678901234567891");
        assert_eq!(trade.size, "10.50");
        assert_eq!(trade.timestamp, "1750428146322");
        assert_eq!(
            trade.fee_rate_bps.as_deref(),
            Some("123456789012345678901234567890")
        );
    }

    #[test]
    fn nested_levels_keep_their_wire_spelling() {
        let msg = ClassifiedMessage::from_text(
            r#"{"event_type":"book","asset_id":"A","market":"M","timestamp":"1",
                "bids":[{"price":0.480,"size":1e3}],"asks":[]}"#,
        );
        let ClassifiedMessage::Book(book) = msg else {
            panic!("expected book, got {msg:?}");
        };
        assert_eq!(book.bids[0].price, "0.480");
        assert_eq!(book.bids[0].size, "1e3");
    }

    #[test]
    fn unknown_raw_reserializes_to_the_input() {
        let text = r#"{"event_type":"mystery","zeta":1,"id":123456789012345678901234567890,"alpha":0.10}"#;
        let ClassifiedMessage::Unknown(unknown) = ClassifiedMessage::from_text(text) else {
            panic!("expected unknown");
        };
        assert_eq!(serde_json::to_string(&unknown.raw).unwrap(), text);
    }

    #[test]
    fn extra_fields_keep_wire_order() {
        let msg = ClassifiedMessage::from_text(
            r#"{"event_type":"best_bid_ask","zeta":"z","asset_id":"A","market":"M",
                "best_bid":"0.73","best_ask":"0.77","timestamp":"1","alpha":0.10,"mid":"m"}"#,
        );
        let ClassifiedMessage::BestBidAsk(top) = msg else {
            panic!("expected best bid ask");
        };
        let keys: Vec<_> = top.extra.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(serde_json::to_string(&top.extra["alpha"]).unwrap(), "0.10");
    }

    #[test]
    fn invalid_json_raw_is_the_text() {
        let msg = ClassifiedMessage::from_text("oops{");
        let ClassifiedMessage::Unknown(unknown) = msg else {
            panic!("expected unknown");
        };
        assert_eq!(unknown.raw, Value::String("oops{".to_string()));
    }

    #[test]
    fn extra_fields_are_kept_without_discriminator() {
        let msg = classify(json!({
            "event_type": "tick_size_change", "asset_id": "A", "market": "M",
            "old_tick_size": 0.01, "new_tick_size": "0.001", "timestamp": "1", "venue": "clob"
        }));
        let ClassifiedMessage::TickSizeChange(change) = msg else {
            panic!("expected tick size change");
        };
        assert_eq!(change.old_tick_size, "0.01");
        assert_eq!(change.extra.get("venue"), Some(&json!("clob")));
        assert!(!change.extra.contains_key(EVENT_TYPE_FIELD));
    }

    #[test]
    fn new_market_accepts_encoded_lists() {
        let msg = classify(json!({
            "event_type": "new_market", "market": "M", "id": 123,
            "outcomes": "[\"Yes\",\"No\"]"
        }));
        let ClassifiedMessage::NewMarket(market) = msg else {
            panic!("expected new market");
        };
        assert_eq!(market.id.as_deref(), Some("123"));
        assert_eq!(market.outcomes, vec!["Yes".to_string(), "No".to_string()]);
    }

    #[test]
    fn serializes_with_event_type_tag() {
        let msg = classify(json!({
            "event_type": "best_bid_ask", "asset_id": "A", "market": "M",
            "best_bid": 0.73, "best_ask": "0.77", "timestamp": 1
        }));
        let out = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            out,
            json!({
                "event_type": "best_bid_ask", "asset_id": "A", "market": "M",
                "best_bid": "0.73", "best_ask": "0.77", "timestamp": "1"
            })
        );
    }

    #[test]
    fn unknown_serializes_reason_and_raw() {
        let msg = ClassifiedMessage::from_text(r#"{"event_type":"mystery","x":1}"#);
        let out = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            out,
            json!({
                "event_type": "unknown",
                "reason": "unrecognized_event_type",
                "raw": {"event_type": "mystery", "x": 1}
            })
        );
    }

    #[test]
    fn inbound_record_shape() {
        let record = InboundMessage {
            seq: 7,
            received_at: DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            message: ClassifiedMessage::from_text("PING?"),
        };
        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["seq"], 7);
        assert_eq!(out["message"]["event_type"], "unknown");
        assert_eq!(out["message"]["raw"], "PING?");
        assert!(out["received_at"].as_str().unwrap().starts_with("2025-01-01T00:00:00"));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z_]{0,12}".prop_map(Value::String),
            prop_oneof![
                Just("book"),
                Just("price_change"),
                Just("last_trade_price"),
                Just("best_bid_ask"),
                Just("new_market"),
            ]
            .prop_map(|s| Value::String(s.to_string())),
        ];
        leaf.prop_recursive(3, 24, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map(
                    prop_oneof![
                        Just("event_type".to_string()),
                        Just("asset_id".to_string()),
                        Just("market".to_string()),
                        Just("timestamp".to_string()),
                        "[a-z]{1,6}"
                    ],
                    inner,
                    0..6
                )
                .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn classify_never_panics_and_unknown_keeps_raw(value in arb_json()) {
            let msg = classify(value.clone());
            if let ClassifiedMessage::Unknown(unknown) = &msg {
                prop_assert_eq!(&unknown.raw, &value);
            }
            prop_assert!(serde_json::to_string(&msg).is_ok());
        }

        #[test]
        fn arbitrary_text_never_panics(text in ".{0,64}") {
            let msg = ClassifiedMessage::from_text(&text);
            if let ClassifiedMessage::Unknown(unknown) = &msg
                && unknown.reason == UnknownReason::InvalidJson
            {
                prop_assert_eq!(&unknown.raw, &Value::String(text.clone()));
            }
        }

        #[test]
        fn string_prices_survive_unchanged(price in "[0-9]{1,4}\\.[0-9]{1,8}") {
            let msg = classify(json!({
                "event_type": "last_trade_price", "asset_id": "A", "market": "M",
                "price": price.clone(), "size": "1", "side": "BUY", "timestamp": "1"
            }));
            let stored = match msg {
                ClassifiedMessage::LastTradePrice(trade) => Some(trade.price),
                _ => None,
            };
            prop_assert_eq!(stored, Some(price));
        }
    }
}
