//! User Channel Authentication Material
//!
//! The authenticated user channel expects an `auth` object inside the initial
//! subscribe payload:
//!
//! ```json
//! {"auth":{"apiKey":"...","secret":"...","passphrase":"..."},"markets":["0x..."],"type":"user"}
//! ```
//!
//! Loading and deriving the credentials happens outside this crate. The
//! recorder treats the object as opaque and only forwards it.
//!
//! # References
//!
//! - [WSS Authentication](https://docs.polymarket.com/developers/CLOB/websocket/wss-auth)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque, already-loaded authentication object for the user channel.
///
/// `Debug` never prints the values.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthMaterial(Map<String, Value>);

impl AuthMaterial {
    /// Wrap an arbitrary auth object.
    #[must_use]
    pub const fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build the auth object from CLOB API credentials.
    #[must_use]
    pub fn from_api_credentials(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        let mut fields = Map::new();
        fields.insert("apiKey".to_string(), Value::String(api_key.into()));
        fields.insert("secret".to_string(), Value::String(secret.into()));
        fields.insert("passphrase".to_string(), Value::String(passphrase.into()));
        Self(fields)
    }

    /// Field names present in the auth object.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Check if the auth object carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for AuthMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for key in self.0.keys() {
            map.entry(key, &"[REDACTED]");
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_credentials_use_camel_case_keys() {
        let auth = AuthMaterial::from_api_credentials("key", "secret", "phrase");
        let json = serde_json::to_value(&auth).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"apiKey": "key", "secret": "secret", "passphrase": "phrase"})
        );
    }

    #[test]
    fn debug_redacts_values() {
        let auth = AuthMaterial::from_api_credentials("key-123", "s3cr3t", "phrase");
        let debug = format!("{auth:?}");

        assert!(debug.contains("apiKey"));
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("key-123"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn opaque_map_round_trips() {
        let mut fields = Map::new();
        fields.insert("token".to_string(), Value::from("abc"));
        let auth = AuthMaterial::from_map(fields);

        assert_eq!(auth.field_names().collect::<Vec<_>>(), vec!["token"]);
        assert!(!auth.is_empty());
        let back: AuthMaterial =
            serde_json::from_str(&serde_json::to_string(&auth).unwrap()).unwrap();
        assert_eq!(back, auth);
    }
}
