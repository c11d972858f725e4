//! Subscription Protocol
//!
//! Builds the payloads that open and adjust a channel subscription.
//!
//! # Wire Format (JSON)
//!
//! ## Initial subscribe (first message on every connection)
//! ```json
//! {"assets_ids":["A","B"],"type":"market"}
//! {"assets_ids":["A","B"],"type":"market","custom_feature_enabled":true}
//! {"auth":{"apiKey":"..."},"markets":["0x..."],"type":"user"}
//! ```
//!
//! ## Incremental change (only after the initial subscribe)
//! ```json
//! {"assets_ids":["C"],"operation":"subscribe"}
//! {"markets":["0x..."],"operation":"unsubscribe"}
//! ```

use serde::Serialize;
use thiserror::Error;

use super::auth::AuthMaterial;
use crate::domain::subscription::StreamIdentifier;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while building subscription payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Auth material was supplied for the public market channel.
    #[error("the market channel does not accept auth material")]
    UnexpectedAuth,

    /// The user channel needs auth material.
    #[error("the user channel requires auth material")]
    MissingAuth,

    /// An incremental change was requested before the initial subscribe.
    #[error("initial subscribe has not been sent on this connection")]
    HandshakeIncomplete,

    /// An incremental change named no identifiers.
    #[error("subscription change has no identifiers")]
    EmptyIdentifiers,

    /// Payload serialization failed.
    #[error("failed to serialize subscription payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

// =============================================================================
// Channel and Operation
// =============================================================================

/// Which CLOB channel the connection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Public market data, keyed by asset id.
    #[default]
    Market,
    /// Authenticated order and trade events, keyed by market id.
    User,
}

impl ChannelKind {
    /// Channel name as sent in the `type` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::User => "user",
        }
    }
}

/// Direction of an incremental subscription change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionOperation {
    /// Start receiving the given identifiers.
    Subscribe,
    /// Stop receiving the given identifiers.
    Unsubscribe,
}

// =============================================================================
// Payloads
// =============================================================================

/// Initial subscribe payload.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest<'a> {
    /// Auth object (user channel only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<&'a AuthMaterial>,

    /// Market ids (user channel only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markets: Option<&'a [StreamIdentifier]>,

    /// Asset ids (market channel only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets_ids: Option<&'a [StreamIdentifier]>,

    /// Channel name.
    #[serde(rename = "type")]
    pub channel: ChannelKind,

    /// Opt in to feature-flagged events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_feature_enabled: Option<bool>,
}

/// Incremental subscribe/unsubscribe payload.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionUpdate<'a> {
    /// Asset ids (market channel only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets_ids: Option<&'a [StreamIdentifier]>,

    /// Market ids (user channel only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markets: Option<&'a [StreamIdentifier]>,

    /// Subscribe or unsubscribe.
    pub operation: SubscriptionOperation,
}

// =============================================================================
// Protocol
// =============================================================================

/// Payload builder for one channel, tracking the per-connection handshake.
#[derive(Debug, Clone)]
pub struct SubscriptionProtocol {
    channel: ChannelKind,
    custom_features: bool,
    auth: Option<AuthMaterial>,
    handshake_sent: bool,
}

impl SubscriptionProtocol {
    /// Create a protocol for the given channel.
    #[must_use]
    pub const fn new(channel: ChannelKind, custom_features: bool, auth: Option<AuthMaterial>) -> Self {
        Self {
            channel,
            custom_features,
            auth,
            handshake_sent: false,
        }
    }

    /// Market channel protocol without auth.
    #[must_use]
    pub const fn market(custom_features: bool) -> Self {
        Self::new(ChannelKind::Market, custom_features, None)
    }

    /// The channel this protocol targets.
    #[must_use]
    pub const fn channel(&self) -> ChannelKind {
        self.channel
    }

    /// Check that the channel and auth material fit together.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedAuth`] or [`ProtocolError::MissingAuth`].
    pub const fn validate(&self) -> Result<(), ProtocolError> {
        match (self.channel, &self.auth) {
            (ChannelKind::Market, Some(_)) => Err(ProtocolError::UnexpectedAuth),
            (ChannelKind::User, None) => Err(ProtocolError::MissingAuth),
            _ => Ok(()),
        }
    }

    /// Build the initial subscribe payload and mark the handshake as sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth material does not fit the channel or
    /// serialization fails.
    pub fn build_initial_subscribe(
        &mut self,
        ids: &[StreamIdentifier],
    ) -> Result<String, ProtocolError> {
        self.validate()?;

        let request = match self.channel {
            ChannelKind::Market => SubscribeRequest {
                auth: None,
                markets: None,
                assets_ids: Some(ids),
                channel: ChannelKind::Market,
                custom_feature_enabled: self.custom_features.then_some(true),
            },
            ChannelKind::User => SubscribeRequest {
                auth: self.auth.as_ref(),
                markets: Some(ids),
                assets_ids: None,
                channel: ChannelKind::User,
                custom_feature_enabled: None,
            },
        };

        let payload = serde_json::to_string(&request)?;
        self.handshake_sent = true;
        Ok(payload)
    }

    /// Build an incremental subscribe or unsubscribe payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::HandshakeIncomplete`] before the initial
    /// subscribe on the current connection and
    /// [`ProtocolError::EmptyIdentifiers`] for an empty list.
    pub fn build_incremental_subscribe(
        &self,
        ids: &[StreamIdentifier],
        operation: SubscriptionOperation,
    ) -> Result<String, ProtocolError> {
        if !self.handshake_sent {
            return Err(ProtocolError::HandshakeIncomplete);
        }
        if ids.is_empty() {
            return Err(ProtocolError::EmptyIdentifiers);
        }

        let update = match self.channel {
            ChannelKind::Market => SubscriptionUpdate {
                assets_ids: Some(ids),
                markets: None,
                operation,
            },
            ChannelKind::User => SubscriptionUpdate {
                assets_ids: None,
                markets: Some(ids),
                operation,
            },
        };

        Ok(serde_json::to_string(&update)?)
    }

    /// Forget the handshake; called whenever a new connection starts.
    pub const fn reset(&mut self) {
        self.handshake_sent = false;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    fn ids(values: &[&str]) -> Vec<StreamIdentifier> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    fn token_auth() -> AuthMaterial {
        let mut fields = Map::new();
        fields.insert("apiKey".to_string(), Value::from("k"));
        AuthMaterial::from_map(fields)
    }

    #[test]
    fn market_payload_is_literal() {
        let mut protocol = SubscriptionProtocol::market(false);
        let payload = protocol.build_initial_subscribe(&ids(&["A", "B"])).unwrap();
        assert_eq!(payload, r#"{"assets_ids":["A","B"],"type":"market"}"#);
        assert!(
            protocol
                .build_incremental_subscribe(&ids(&["C"]), SubscriptionOperation::Subscribe)
                .is_ok()
        );
    }

    #[test]
    fn market_payload_for_an_empty_set() {
        let mut protocol = SubscriptionProtocol::market(false);
        let payload = protocol.build_initial_subscribe(&[]).unwrap();
        assert_eq!(payload, r#"{"assets_ids":[],"type":"market"}"#);
    }

    #[test]
    fn market_payload_with_custom_features() {
        let mut protocol = SubscriptionProtocol::market(true);
        let payload = protocol.build_initial_subscribe(&ids(&["A", "B"])).unwrap();
        assert_eq!(
            payload,
            r#"{"assets_ids":["A","B"],"type":"market","custom_feature_enabled":true}"#
        );
    }

    #[test]
    fn user_payload_carries_auth_and_markets() {
        let mut protocol = SubscriptionProtocol::new(ChannelKind::User, true, Some(token_auth()));
        let payload = protocol.build_initial_subscribe(&ids(&["0xm"])).unwrap();
        assert_eq!(
            payload,
            r#"{"auth":{"apiKey":"k"},"markets":["0xm"],"type":"user"}"#
        );
    }

    #[test]
    fn market_rejects_auth() {
        let mut protocol = SubscriptionProtocol::new(ChannelKind::Market, false, Some(token_auth()));
        assert!(matches!(
            protocol.build_initial_subscribe(&ids(&["A"])),
            Err(ProtocolError::UnexpectedAuth)
        ));
        assert!(matches!(
            protocol.build_incremental_subscribe(&ids(&["A"]), SubscriptionOperation::Subscribe),
            Err(ProtocolError::HandshakeIncomplete)
        ));
    }

    #[test]
    fn user_requires_auth() {
        let mut protocol = SubscriptionProtocol::new(ChannelKind::User, false, None);
        assert!(matches!(
            protocol.build_initial_subscribe(&ids(&["0xm"])),
            Err(ProtocolError::MissingAuth)
        ));
    }

    #[test]
    fn incremental_requires_handshake() {
        let mut protocol = SubscriptionProtocol::market(false);
        assert!(matches!(
            protocol.build_incremental_subscribe(&ids(&["C"]), SubscriptionOperation::Subscribe),
            Err(ProtocolError::HandshakeIncomplete)
        ));

        protocol.build_initial_subscribe(&ids(&["A"])).unwrap();
        protocol.reset();
        assert!(matches!(
            protocol.build_incremental_subscribe(&ids(&["C"]), SubscriptionOperation::Subscribe),
            Err(ProtocolError::HandshakeIncomplete)
        ));
    }

    #[test]
    fn incremental_rejects_empty_list() {
        let mut protocol = SubscriptionProtocol::market(false);
        protocol.build_initial_subscribe(&ids(&["A"])).unwrap();
        assert!(matches!(
            protocol.build_incremental_subscribe(&[], SubscriptionOperation::Unsubscribe),
            Err(ProtocolError::EmptyIdentifiers)
        ));
    }

    #[test]
    fn incremental_payloads_are_literal() {
        let mut protocol = SubscriptionProtocol::market(true);
        protocol.build_initial_subscribe(&ids(&["A"])).unwrap();

        assert_eq!(
            protocol
                .build_incremental_subscribe(&ids(&["C", "D"]), SubscriptionOperation::Subscribe)
                .unwrap(),
            r#"{"assets_ids":["C","D"],"operation":"subscribe"}"#
        );
        assert_eq!(
            protocol
                .build_incremental_subscribe(&ids(&["A"]), SubscriptionOperation::Unsubscribe)
                .unwrap(),
            r#"{"assets_ids":["A"],"operation":"unsubscribe"}"#
        );
    }

    #[test]
    fn user_incremental_uses_markets() {
        let mut protocol = SubscriptionProtocol::new(ChannelKind::User, false, Some(token_auth()));
        protocol.build_initial_subscribe(&ids(&["0xa"])).unwrap();
        assert_eq!(
            protocol
                .build_incremental_subscribe(&ids(&["0xb"]), SubscriptionOperation::Subscribe)
                .unwrap(),
            r#"{"markets":["0xb"],"operation":"subscribe"}"#
        );
    }
}
