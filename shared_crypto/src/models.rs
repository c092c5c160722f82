// rsa_handshake_chat/shared_crypto/src/models.rs

use serde::{Deserialize, Serialize};

use crate::cipher::Ciphertext;

/// Event name signed and posted to a registered webhook.
pub const NEW_MESSAGE_EVENT: &str = "new_message";

/// Challenge sent to the responder's `/handshake` endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub nonce: String,
    #[serde(with = "decimal")]
    pub signature: num_bigint::BigUint,
    /// Where the responder fetches the initiator's public key.
    pub partner_key_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// Configured role id of the initiator. Absent means the responder's
    /// designated partner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegisterWebhookRequest {
    pub webhook_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

/// Inbound webhook callback; only the signature is mandatory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WebhookCallback {
    #[serde(with = "decimal")]
    pub signature: num_bigint::BigUint,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
}

/// Signed notification posted to a peer's webhook.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WebhookNotification {
    pub event: String,
    pub sender: String,
    #[serde(with = "decimal")]
    pub signature: num_bigint::BigUint,
    pub timestamp: String,
}

/// Ciphertext relayed to the peer's `/receive` endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EncryptedChatMessage {
    pub text: Ciphertext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

/// Serde adapter for big integers as decimal strings.
///
/// Plain JSON integers are accepted on input as well.
pub mod decimal {
    use num_bigint::BigUint;
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text
                .parse::<BigUint>()
                .map_err(|e| de::Error::custom(format!("invalid decimal integer {text:?}: {e}"))),
            Repr::Number(n) => Ok(BigUint::from(n)),
        }
    }
}
