// rsa_handshake_chat/shared_crypto/src/transport.rs

//! Outbound calls the handshake coordinator makes to its peers.
//!
//! The coordinator is transport agnostic; the chat binary provides an HTTP
//! implementation and tests provide an in-memory one.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::keygen::PublicKey;

/// Reliable request/response transport to a peer.
///
/// Each call is attempted once. A timeout and a refused connection both
/// surface as [`crate::Error::TransportFailure`].
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// GET a `{e, n}` public key document.
    async fn fetch_public_key(&self, url: &str, timeout: Duration) -> Result<PublicKey>;

    /// POST a JSON body and return the JSON reply.
    async fn post_json(
        &self,
        url: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value>;
}

/// Upper bounds for each kind of remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub handshake: Duration,
    pub key_fetch: Duration,
    pub relay: Duration,
    pub webhook: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(5),
            key_fetch: Duration::from_secs(5),
            relay: Duration::from_secs(5),
            webhook: Duration::from_secs(3),
        }
    }
}
