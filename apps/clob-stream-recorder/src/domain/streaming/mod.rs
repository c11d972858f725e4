//! Market Stream Types
//!
//! Classification outcomes for inbound market events and the connection
//! state machine driven by the market stream client.
//!
//! ```text
//! Disconnected ─► Connecting ─► Subscribing ─► Live ─┐
//!                     ▲              │          │    │ (frame)
//!                     │              ▼          ▼    │
//!                     └──────── Reconnecting ◄──┘◄───┘
//!
//! any state ─► Terminated (stop request or message limit)
//! ```

use serde::Serialize;

// =============================================================================
// Event Kinds
// =============================================================================

/// Outcome of classifying one logical message.
///
/// Closed set, so per-kind counters stay bounded for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Full order book snapshot.
    Book,
    /// Incremental book level changes.
    PriceChange,
    /// Minimum tick size change.
    TickSizeChange,
    /// Trade print.
    LastTradePrice,
    /// Top of book update (feature-flagged).
    BestBidAsk,
    /// Market creation (feature-flagged).
    NewMarket,
    /// Market resolution (feature-flagged).
    MarketResolved,
    /// Anything that could not be classified as a known event.
    Unknown {
        /// The frame was not valid JSON at all.
        undecodable: bool,
    },
}

impl EventKind {
    /// Wire name of the event type, `unknown` for unclassified messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::PriceChange => "price_change",
            Self::TickSizeChange => "tick_size_change",
            Self::LastTradePrice => "last_trade_price",
            Self::BestBidAsk => "best_bid_ask",
            Self::NewMarket => "new_market",
            Self::MarketResolved => "market_resolved",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Whether the message was classified into a known variant.
    #[must_use]
    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown { .. })
    }

    /// Look up a known kind by its wire `event_type`.
    #[must_use]
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "book" => Some(Self::Book),
            "price_change" => Some(Self::PriceChange),
            "tick_size_change" => Some(Self::TickSizeChange),
            "last_trade_price" => Some(Self::LastTradePrice),
            "best_bid_ask" => Some(Self::BestBidAsk),
            "new_market" => Some(Self::NewMarket),
            "market_resolved" => Some(Self::MarketResolved),
            _ => None,
        }
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// State of the single upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    #[default]
    Disconnected,
    /// Transport connection is being established.
    Connecting,
    /// Subscribe payload sent, waiting for the first frame.
    Subscribing,
    /// Frames are flowing.
    Live,
    /// Connection lost, waiting out the backoff delay.
    Reconnecting,
    /// Stopped for good.
    Terminated,
}

impl ConnectionState {
    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// `Live -> Live` is allowed (every frame keeps the session live).
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{Connecting, Disconnected, Live, Reconnecting, Subscribing, Terminated};

        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated)
            | (Disconnected, Connecting)
            | (Connecting, Subscribing | Reconnecting)
            | (Subscribing, Live | Reconnecting)
            | (Live, Live | Reconnecting)
            | (Reconnecting, Connecting) => true,
            _ => false,
        }
    }

    /// Whether no further transitions can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Lowercase name used in progress lines and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribing => "subscribing",
            Self::Live => "live",
            Self::Reconnecting => "reconnecting",
            Self::Terminated => "terminated",
        }
    }

    /// All states, in lifecycle order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Disconnected,
            Self::Connecting,
            Self::Subscribing,
            Self::Live,
            Self::Reconnecting,
            Self::Terminated,
        ]
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ConnectionState::Disconnected, ConnectionState::Connecting ; "start")]
    #[test_case(ConnectionState::Connecting, ConnectionState::Subscribing ; "connected")]
    #[test_case(ConnectionState::Connecting, ConnectionState::Reconnecting ; "connect failed")]
    #[test_case(ConnectionState::Subscribing, ConnectionState::Live ; "first frame")]
    #[test_case(ConnectionState::Live, ConnectionState::Live ; "frame while live")]
    #[test_case(ConnectionState::Live, ConnectionState::Reconnecting ; "lost")]
    #[test_case(ConnectionState::Reconnecting, ConnectionState::Connecting ; "backoff elapsed")]
    fn allowed_transitions(from: ConnectionState, to: ConnectionState) {
        assert!(from.can_transition_to(to));
    }

    #[test_case(ConnectionState::Disconnected, ConnectionState::Live ; "skip handshake")]
    #[test_case(ConnectionState::Live, ConnectionState::Connecting ; "reconnect without backoff")]
    #[test_case(ConnectionState::Reconnecting, ConnectionState::Live ; "live without connect")]
    #[test_case(ConnectionState::Subscribing, ConnectionState::Subscribing ; "resubscribe")]
    fn rejected_transitions(from: ConnectionState, to: ConnectionState) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn any_state_can_terminate_once() {
        for state in ConnectionState::all() {
            let expected = !state.is_terminal();
            assert_eq!(
                state.can_transition_to(ConnectionState::Terminated),
                expected,
                "{state}"
            );
        }
        for state in ConnectionState::all() {
            assert!(!ConnectionState::Terminated.can_transition_to(*state));
        }
    }

    #[test_case("book", EventKind::Book)]
    #[test_case("price_change", EventKind::PriceChange)]
    #[test_case("tick_size_change", EventKind::TickSizeChange)]
    #[test_case("last_trade_price", EventKind::LastTradePrice)]
    #[test_case("best_bid_ask", EventKind::BestBidAsk)]
    #[test_case("new_market", EventKind::NewMarket)]
    #[test_case("market_resolved", EventKind::MarketResolved)]
    fn event_kind_label_round_trips(name: &str, kind: EventKind) {
        assert_eq!(EventKind::from_event_type(name), Some(kind));
        assert_eq!(kind.label(), name);
        assert!(kind.is_known());
    }

    #[test]
    fn unknown_kind() {
        assert_eq!(EventKind::from_event_type("trade"), None);
        let kind = EventKind::Unknown { undecodable: true };
        assert_eq!(kind.label(), "unknown");
        assert!(!kind.is_known());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Reconnecting).unwrap(),
            "\"reconnecting\""
        );
        assert_eq!(ConnectionState::Live.to_string(), "live");
    }
}
