// rsa_handshake_chat/shared_crypto/src/handshake.rs

//! Mutual authentication between two configured parties.
//!
//! Each side proves possession of its private key by signing a fresh nonce.
//! The responder fetches the initiator's public key, checks the signature
//! and only then trusts the key. The wire protocol carries no session id;
//! both directions may run independently and concurrently.
//!
//! Per peer the coordinator tracks:
//!
//! ```text
//! Unauthenticated --initiate--> Challenging --key fetched--> Authenticated
//!        \------------------accept (verified)-------------------/
//! ```
//!
//! A failed step never overwrites previously trusted state.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use num_bigint::BigUint;
use serde::Serialize;
use tokio::sync::Mutex;
use url::Url;

use crate::cipher::{self, Ciphertext};
use crate::error::{Error, Result};
use crate::keygen::{KeyPair, PublicKey};
use crate::models::{
    EncryptedChatMessage, HandshakeRequest, WebhookNotification, NEW_MESSAGE_EVENT,
};
use crate::signature;
use crate::transport::{PeerTransport, Timeouts};

/// Accepted nonces remembered per peer for replay rejection.
const REPLAY_WINDOW: usize = 32;

/// Configured role identifier of a party, e.g. `alice`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeState {
    Unauthenticated,
    Challenging,
    Authenticated,
}

/// What we know about a remote party.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerIdentity {
    pub public_key: Option<PublicKey>,
    pub webhook_url: Option<String>,
}

/// A signed nonce for one handshake attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub nonce: String,
    pub signature: BigUint,
}

/// How peers reach this party.
#[derive(Debug, Clone)]
pub struct LocalEndpoints {
    pub id: PeerId,
    pub public_key_url: String,
    pub webhook_url: Option<String>,
}

/// Where a designated peer lives.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub id: PeerId,
    pub handshake_url: String,
    pub public_key_url: String,
    pub receive_url: String,
}

impl PeerConfig {
    /// Standard endpoint layout under a base URL.
    pub fn from_base_url(id: PeerId, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            id,
            handshake_url: format!("{base}/handshake"),
            public_key_url: format!("{base}/public_key"),
            receive_url: format!("{base}/receive"),
        }
    }
}

struct PeerRecord {
    identity: PeerIdentity,
    state: HandshakeState,
    accepted_nonces: VecDeque<(String, BigUint)>,
}

struct PeerSlot {
    config: PeerConfig,
    record: Mutex<PeerRecord>,
    // Held while this side runs an initiator handshake for the peer.
    in_flight: Mutex<()>,
}

/// Runs handshakes, key fetches and webhook notifications for one party.
pub struct HandshakeCoordinator<T> {
    keys: KeyPair,
    local: LocalEndpoints,
    peers: HashMap<PeerId, PeerSlot>,
    transport: T,
    timeouts: Timeouts,
}

impl<T: PeerTransport> HandshakeCoordinator<T> {
    pub fn new(
        keys: KeyPair,
        local: LocalEndpoints,
        peers: Vec<PeerConfig>,
        transport: T,
        timeouts: Timeouts,
    ) -> Self {
        let peers = peers
            .into_iter()
            .map(|config| {
                let slot = PeerSlot {
                    config: config.clone(),
                    record: Mutex::new(PeerRecord {
                        identity: PeerIdentity::default(),
                        state: HandshakeState::Unauthenticated,
                        accepted_nonces: VecDeque::with_capacity(REPLAY_WINDOW),
                    }),
                    in_flight: Mutex::new(()),
                };
                (config.id, slot)
            })
            .collect();
        Self {
            keys,
            local,
            peers,
            transport,
            timeouts,
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local.id
    }

    pub fn public_key(&self) -> &PublicKey {
        self.keys.public()
    }

    /// Whether the local modulus can carry every Unicode code point.
    pub fn covers_unicode(&self) -> bool {
        self.keys.covers_unicode()
    }

    /// Configured peers, in no particular order.
    pub fn peer_ids(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.keys()
    }

    /// Resolves the sender of an inbound request to a configured peer.
    ///
    /// Without an explicit sender the sole configured partner is assumed.
    pub fn resolve_peer(&self, sender: Option<&str>) -> Result<PeerId> {
        match sender {
            Some(name) => {
                let id = PeerId::from(name);
                if self.peers.contains_key(&id) {
                    Ok(id)
                } else {
                    Err(Error::AuthenticationFailure(format!(
                        "{name} is not a configured peer"
                    )))
                }
            }
            None if self.peers.len() == 1 => self
                .peers
                .keys()
                .next()
                .cloned()
                .ok_or_else(|| Error::InvalidInput("no peer configured".into())),
            None => Err(Error::InvalidInput(
                "sender is required when several peers are configured".into(),
            )),
        }
    }

    fn slot(&self, peer: &PeerId) -> Result<&PeerSlot> {
        self.peers
            .get(peer)
            .ok_or_else(|| Error::InvalidInput(format!("unknown peer {peer}")))
    }

    pub async fn peer_state(&self, peer: &PeerId) -> Result<HandshakeState> {
        Ok(self.slot(peer)?.record.lock().await.state)
    }

    pub async fn peer_identity(&self, peer: &PeerId) -> Result<PeerIdentity> {
        Ok(self.slot(peer)?.record.lock().await.identity.clone())
    }

    /// Signs a freshly drawn nonce with the local private key.
    pub fn challenge(&self) -> Challenge {
        let nonce = signature::generate_nonce(&mut rand::thread_rng(), &self.keys.public().n);
        let signature = signature::sign(&nonce, self.keys.private());
        Challenge { nonce, signature }
    }

    /// Sends a signed challenge to the peer's handshake endpoint.
    ///
    /// The peer moves to `Challenging` while the call is outstanding and
    /// stays there on success until its key is fetched. On failure the
    /// previous state is restored, unless the peer was authenticated in the
    /// meantime.
    pub async fn initiate_handshake(&self, peer: &PeerId) -> Result<Challenge> {
        let slot = self.slot(peer)?;
        let previous = {
            let mut record = slot.record.lock().await;
            let previous = record.state;
            if previous != HandshakeState::Authenticated {
                record.state = HandshakeState::Challenging;
            }
            previous
        };

        let challenge = self.challenge();
        let request = HandshakeRequest {
            nonce: challenge.nonce.clone(),
            signature: challenge.signature.clone(),
            partner_key_url: self.local.public_key_url.clone(),
            webhook_url: self.local.webhook_url.clone(),
            sender: Some(self.local.id.to_string()),
        };
        let body = serde_json::to_value(&request)?;

        tracing::debug!(peer = %peer, url = %slot.config.handshake_url, "sending handshake");
        match self
            .transport
            .post_json(&slot.config.handshake_url, body, self.timeouts.handshake)
            .await
        {
            Ok(_) => {
                tracing::info!(peer = %peer, "handshake acknowledged");
                Ok(challenge)
            }
            Err(e) => {
                let mut record = slot.record.lock().await;
                if record.identity.public_key.is_none() {
                    record.state = previous;
                }
                tracing::warn!(peer = %peer, error = %e, "handshake rejected");
                Err(e)
            }
        }
    }

    /// Responder side: authenticates the initiator and trusts its key.
    ///
    /// Any failure leaves the stored identity exactly as it was.
    pub async fn accept_handshake(&self, peer: &PeerId, request: HandshakeRequest) -> Result<()> {
        let slot = self.slot(peer)?;
        if let Some(url) = &request.webhook_url {
            validate_webhook_url(url)?;
        }

        let partner_key = self
            .transport
            .fetch_public_key(&request.partner_key_url, self.timeouts.key_fetch)
            .await
            .map_err(|e| {
                tracing::warn!(peer = %peer, url = %request.partner_key_url, error = %e, "partner key fetch failed");
                Error::AuthenticationFailure(format!("could not fetch partner key: {e}"))
            })?;

        if !signature::verify(&request.signature, &request.nonce, &partner_key) {
            tracing::warn!(peer = %peer, nonce = %request.nonce, "handshake signature rejected");
            return Err(Error::AuthenticationFailure(
                "nonce signature does not match partner key".into(),
            ));
        }

        let mut record = slot.record.lock().await;
        let seen = (request.nonce.clone(), partner_key.n.clone());
        if record.accepted_nonces.contains(&seen) {
            tracing::warn!(peer = %peer, nonce = %request.nonce, "replayed handshake nonce");
            return Err(Error::AuthenticationFailure("nonce already used".into()));
        }
        if record.accepted_nonces.len() == REPLAY_WINDOW {
            record.accepted_nonces.pop_front();
        }
        record.accepted_nonces.push_back(seen);

        record.identity.public_key = Some(partner_key);
        record.state = HandshakeState::Authenticated;
        if let Some(url) = request.webhook_url {
            tracing::info!(peer = %peer, webhook = %url, "partner webhook registered");
            record.identity.webhook_url = Some(url);
        }
        tracing::info!(peer = %peer, "peer authenticated");
        Ok(())
    }

    /// Returns the peer's trusted key, running an initiator handshake first
    /// when none is known.
    ///
    /// Concurrent callers for the same peer wait for one handshake instead
    /// of racing duplicates. Nothing is committed unless every step succeeds.
    pub async fn ensure_authenticated(&self, peer: &PeerId) -> Result<PublicKey> {
        let slot = self.slot(peer)?;
        if let Some(key) = slot.record.lock().await.identity.public_key.clone() {
            return Ok(key);
        }

        let _in_flight = slot.in_flight.lock().await;
        if let Some(key) = slot.record.lock().await.identity.public_key.clone() {
            return Ok(key);
        }
        self.complete_handshake(peer, slot).await
    }

    /// Runs a fresh initiator handshake and fetches the peer's key, even when
    /// one is already trusted.
    pub async fn authenticate(&self, peer: &PeerId) -> Result<PublicKey> {
        let slot = self.slot(peer)?;
        let _in_flight = slot.in_flight.lock().await;
        self.complete_handshake(peer, slot).await
    }

    // Caller holds the peer's in-flight lock.
    async fn complete_handshake(&self, peer: &PeerId, slot: &PeerSlot) -> Result<PublicKey> {
        self.initiate_handshake(peer).await?;

        let key = match self
            .transport
            .fetch_public_key(&slot.config.public_key_url, self.timeouts.key_fetch)
            .await
        {
            Ok(key) => key,
            Err(e) => {
                let mut record = slot.record.lock().await;
                if record.identity.public_key.is_none() {
                    record.state = HandshakeState::Unauthenticated;
                }
                return Err(Error::KeyUnavailable(format!(
                    "could not fetch public key of {peer}: {e}"
                )));
            }
        };

        let mut record = slot.record.lock().await;
        record.identity.public_key = Some(key.clone());
        record.state = HandshakeState::Authenticated;
        tracing::info!(peer = %peer, "peer public key obtained");
        Ok(key)
    }

    /// Records where the peer wants to be notified.
    pub async fn register_webhook(&self, peer: &PeerId, url: &str) -> Result<()> {
        let slot = self.slot(peer)?;
        validate_webhook_url(url)?;
        slot.record.lock().await.identity.webhook_url = Some(url.to_string());
        tracing::info!(peer = %peer, webhook = %url, "webhook registered");
        Ok(())
    }

    /// Posts a signed `new_message` event to the peer's webhook, if any.
    ///
    /// Best effort: failures are logged and never reach the caller.
    pub async fn notify_webhook(&self, peer: &PeerId) {
        let Ok(slot) = self.slot(peer) else {
            tracing::warn!(peer = %peer, "notification for unknown peer skipped");
            return;
        };
        let Some(url) = slot.record.lock().await.identity.webhook_url.clone() else {
            return;
        };

        let notification = WebhookNotification {
            event: NEW_MESSAGE_EVENT.to_string(),
            sender: self.local.id.to_string(),
            signature: signature::sign(NEW_MESSAGE_EVENT, self.keys.private()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let body = match serde_json::to_value(&notification) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "could not encode webhook notification");
                return;
            }
        };

        match self
            .transport
            .post_json(&url, body, self.timeouts.webhook)
            .await
        {
            Ok(_) => tracing::debug!(peer = %peer, webhook = %url, "webhook notified"),
            Err(e) => tracing::warn!(peer = %peer, webhook = %url, error = %e, "webhook notification failed"),
        }
    }

    /// Checks a webhook callback against the peer's trusted key.
    pub async fn verify_webhook_notification(
        &self,
        peer: &PeerId,
        signature: &BigUint,
    ) -> Result<()> {
        let slot = self.slot(peer)?;
        let key = slot
            .record
            .lock()
            .await
            .identity
            .public_key
            .clone()
            .ok_or_else(|| Error::AuthenticationFailure(format!("no trusted key for {peer}")))?;
        if signature::verify(signature, NEW_MESSAGE_EVENT, &key) {
            Ok(())
        } else {
            Err(Error::AuthenticationFailure(
                "webhook signature does not match peer key".into(),
            ))
        }
    }

    /// Encrypts `text` to the peer and relays it to its receive endpoint.
    pub async fn send_message(&self, peer: &PeerId, text: &str) -> Result<Ciphertext> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("message is empty".into()));
        }
        let slot = self.slot(peer)?;
        let key = self.ensure_authenticated(peer).await?;
        let ciphertext = cipher::encrypt(text, &key)?;

        let message = EncryptedChatMessage {
            text: ciphertext.clone(),
            sender: Some(self.local.id.to_string()),
        };
        let body = serde_json::to_value(&message)?;
        self.transport
            .post_json(&slot.config.receive_url, body, self.timeouts.relay)
            .await?;
        tracing::info!(peer = %peer, symbols = ciphertext.len(), "message relayed");
        Ok(ciphertext)
    }

    /// Decrypts an inbound message with the local private key.
    pub fn decrypt_incoming(&self, ciphertext: &Ciphertext) -> Result<String> {
        cipher::decrypt(ciphertext, self.keys.private())
    }
}

/// Accepts only absolute URLs that carry both a scheme and a host.
pub fn validate_webhook_url(url: &str) -> Result<Url> {
    let parsed =
        Url::parse(url).map_err(|e| Error::InvalidInput(format!("invalid URL {url:?}: {e}")))?;
    if parsed.scheme().is_empty() || !parsed.has_host() {
        return Err(Error::InvalidInput(format!(
            "URL {url:?} needs a scheme and a host"
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex, Weak};
    use std::time::Duration;

    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::{json, Value};

    use crate::keygen::{generate_key_pair_with_rng, KeyRange};
    use crate::models::StatusResponse;

    type Coordinator = HandshakeCoordinator<Loopback>;

    enum Route {
        PublicKey(PublicKey),
        Handshake(Weak<Coordinator>),
        Receive(Weak<Coordinator>),
        Sink,
        Down,
    }

    /// In-memory network: URLs map to routes, every POST is recorded.
    #[derive(Clone, Default)]
    struct Loopback {
        routes: Arc<StdMutex<HashMap<String, Route>>>,
        posts: Arc<StdMutex<Vec<(String, Value)>>>,
    }

    impl Loopback {
        fn route(&self, url: &str, route: Route) {
            self.routes.lock().unwrap().insert(url.to_string(), route);
        }

        fn posts_to(&self, url: &str) -> Vec<Value> {
            self.posts
                .lock()
                .unwrap()
                .iter()
                .filter(|(u, _)| u == url)
                .map(|(_, body)| body.clone())
                .collect()
        }
    }

    #[async_trait]
    impl PeerTransport for Loopback {
        async fn fetch_public_key(&self, url: &str, _timeout: Duration) -> Result<PublicKey> {
            match self.routes.lock().unwrap().get(url) {
                Some(Route::PublicKey(key)) => Ok(key.clone()),
                _ => Err(Error::TransportFailure(format!("connection refused: {url}"))),
            }
        }

        async fn post_json(&self, url: &str, body: Value, _timeout: Duration) -> Result<Value> {
            self.posts
                .lock()
                .unwrap()
                .push((url.to_string(), body.clone()));
            let target = {
                let routes = self.routes.lock().unwrap();
                match routes.get(url) {
                    Some(Route::Handshake(c)) => Some((true, c.upgrade())),
                    Some(Route::Receive(c)) => Some((false, c.upgrade())),
                    Some(Route::Sink) => return Ok(json!({"status": "ok"})),
                    Some(Route::Down) | Some(Route::PublicKey(_)) | None => None,
                }
            };
            let Some((is_handshake, Some(coordinator))) = target else {
                return Err(Error::TransportFailure(format!("connection refused: {url}")));
            };
            if is_handshake {
                let request: HandshakeRequest = serde_json::from_value(body)?;
                let peer = coordinator.resolve_peer(request.sender.as_deref())?;
                coordinator.accept_handshake(&peer, request).await?;
            } else {
                let message: EncryptedChatMessage = serde_json::from_value(body)?;
                coordinator.decrypt_incoming(&message.text)?;
            }
            Ok(serde_json::to_value(StatusResponse::new("ok"))?)
        }
    }

    fn keys(seed: u64) -> KeyPair {
        let mut rng = StdRng::seed_from_u64(seed);
        generate_key_pair_with_rng(&mut rng, KeyRange::default()).unwrap()
    }

    fn coordinator(name: &str, peer: &str, seed: u64, net: &Loopback) -> Arc<Coordinator> {
        let base = format!("http://{name}.test");
        let local = LocalEndpoints {
            id: PeerId::from(name),
            public_key_url: format!("{base}/public_key"),
            webhook_url: Some(format!("{base}/webhook_callback")),
        };
        let peer = PeerConfig::from_base_url(PeerId::from(peer), &format!("http://{peer}.test"));
        let coordinator = Arc::new(HandshakeCoordinator::new(
            keys(seed),
            local,
            vec![peer],
            net.clone(),
            Timeouts::default(),
        ));
        net.route(
            &format!("{base}/public_key"),
            Route::PublicKey(coordinator.public_key().clone()),
        );
        net.route(
            &format!("{base}/handshake"),
            Route::Handshake(Arc::downgrade(&coordinator)),
        );
        net.route(
            &format!("{base}/receive"),
            Route::Receive(Arc::downgrade(&coordinator)),
        );
        net.route(&format!("{base}/webhook_callback"), Route::Sink);
        coordinator
    }

    fn pair() -> (Loopback, Arc<Coordinator>, Arc<Coordinator>) {
        let net = Loopback::default();
        let alice = coordinator("alice", "bob", 1, &net);
        let bob = coordinator("bob", "alice", 2, &net);
        (net, alice, bob)
    }

    #[tokio::test]
    async fn initiated_handshake_authenticates_both_sides() {
        let (_net, alice, bob) = pair();
        let bob_id = PeerId::from("bob");
        let alice_id = PeerId::from("alice");

        assert_eq!(
            alice.peer_state(&bob_id).await.unwrap(),
            HandshakeState::Unauthenticated
        );
        let key = alice.ensure_authenticated(&bob_id).await.unwrap();
        assert_eq!(&key, bob.public_key());
        assert_eq!(
            alice.peer_state(&bob_id).await.unwrap(),
            HandshakeState::Authenticated
        );

        let seen_by_bob = bob.peer_identity(&alice_id).await.unwrap();
        assert_eq!(seen_by_bob.public_key.as_ref(), Some(alice.public_key()));
        assert_eq!(
            seen_by_bob.webhook_url.as_deref(),
            Some("http://alice.test/webhook_callback")
        );
        assert_eq!(
            bob.peer_state(&alice_id).await.unwrap(),
            HandshakeState::Authenticated
        );
    }

    #[tokio::test]
    async fn initiate_handshake_leaves_initiator_challenging() {
        let (_net, alice, _bob) = pair();
        let bob_id = PeerId::from("bob");
        let challenge = alice.initiate_handshake(&bob_id).await.unwrap();
        assert!(signature::verify(
            &challenge.signature,
            &challenge.nonce,
            alice.public_key()
        ));
        assert_eq!(
            alice.peer_state(&bob_id).await.unwrap(),
            HandshakeState::Challenging
        );
    }

    #[tokio::test]
    async fn authenticate_repeats_the_handshake_and_trusts_the_key() {
        let (net, alice, bob) = pair();
        let bob_id = PeerId::from("bob");

        let key = alice.authenticate(&bob_id).await.unwrap();
        assert_eq!(&key, bob.public_key());
        assert_eq!(
            alice.peer_state(&bob_id).await.unwrap(),
            HandshakeState::Authenticated
        );

        alice.authenticate(&bob_id).await.unwrap();
        assert_eq!(net.posts_to("http://bob.test/handshake").len(), 2);
        assert_eq!(
            alice.peer_state(&bob_id).await.unwrap(),
            HandshakeState::Authenticated
        );
    }

    #[tokio::test]
    async fn authenticate_resets_state_when_key_fetch_fails() {
        let (net, alice, _bob) = pair();
        let bob_id = PeerId::from("bob");
        net.route("http://bob.test/public_key", Route::Down);

        let err = alice.authenticate(&bob_id).await.unwrap_err();
        assert!(matches!(err, Error::KeyUnavailable(_)));
        assert_eq!(
            alice.peer_state(&bob_id).await.unwrap(),
            HandshakeState::Unauthenticated
        );
    }

    /// Holds every POST until released, then fails it.
    struct Stalled {
        key: PublicKey,
        release: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl PeerTransport for Stalled {
        async fn fetch_public_key(&self, _url: &str, _timeout: Duration) -> Result<PublicKey> {
            Ok(self.key.clone())
        }

        async fn post_json(&self, url: &str, _body: Value, _timeout: Duration) -> Result<Value> {
            self.release.notified().await;
            Err(Error::TransportFailure(format!("connection reset: {url}")))
        }
    }

    #[tokio::test]
    async fn failed_initiate_keeps_concurrent_acceptance() {
        let bob_keys = keys(2);
        let release = Arc::new(tokio::sync::Notify::new());
        let alice = HandshakeCoordinator::new(
            keys(1),
            LocalEndpoints {
                id: PeerId::from("alice"),
                public_key_url: "http://alice.test/public_key".into(),
                webhook_url: None,
            },
            vec![PeerConfig::from_base_url(PeerId::from("bob"), "http://bob.test")],
            Stalled {
                key: bob_keys.public().clone(),
                release: Arc::clone(&release),
            },
            Timeouts::default(),
        );
        let bob_id = PeerId::from("bob");
        let request = HandshakeRequest {
            nonce: "4821".into(),
            signature: signature::sign("4821", bob_keys.private()),
            partner_key_url: "http://bob.test/public_key".into(),
            webhook_url: None,
            sender: Some("bob".into()),
        };

        // Bob's own handshake lands while ours is still on the wire.
        let (initiated, accepted) = tokio::join!(alice.initiate_handshake(&bob_id), async {
            let accepted = alice.accept_handshake(&bob_id, request).await;
            release.notify_one();
            accepted
        });
        assert!(initiated.is_err());
        accepted.unwrap();

        assert_eq!(
            alice.peer_state(&bob_id).await.unwrap(),
            HandshakeState::Authenticated
        );
        assert_eq!(
            alice.peer_identity(&bob_id).await.unwrap().public_key.as_ref(),
            Some(bob_keys.public())
        );
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected_without_mutation() {
        let (_net, alice, bob) = pair();
        let alice_id = PeerId::from("alice");
        let challenge = alice.challenge();
        let request = HandshakeRequest {
            nonce: challenge.nonce.clone(),
            signature: &challenge.signature + 1u32,
            partner_key_url: "http://alice.test/public_key".into(),
            webhook_url: Some("http://alice.test/webhook_callback".into()),
            sender: Some("alice".into()),
        };

        let err = bob.accept_handshake(&alice_id, request.clone()).await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailure(_)));
        assert_eq!(bob.peer_identity(&alice_id).await.unwrap(), PeerIdentity::default());
        assert_eq!(
            bob.peer_state(&alice_id).await.unwrap(),
            HandshakeState::Unauthenticated
        );

        // With a previously trusted key the tampered attempt changes nothing either.
        let mut genuine = request.clone();
        genuine.signature = challenge.signature.clone();
        genuine.webhook_url = None;
        bob.accept_handshake(&alice_id, genuine).await.unwrap();
        let before = bob.peer_identity(&alice_id).await.unwrap();

        let mut forged = request;
        forged.partner_key_url = "http://bob.test/public_key".into();
        forged.webhook_url = Some("http://mallory.test/hook".into());
        let err = bob.accept_handshake(&alice_id, forged).await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailure(_)));
        assert_eq!(bob.peer_identity(&alice_id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn unreachable_partner_key_is_an_authentication_failure() {
        let (_net, alice, bob) = pair();
        let challenge = alice.challenge();
        let request = HandshakeRequest {
            nonce: challenge.nonce,
            signature: challenge.signature,
            partner_key_url: "http://nowhere.test/public_key".into(),
            webhook_url: None,
            sender: None,
        };
        let alice_id = bob.resolve_peer(None).unwrap();
        let err = bob.accept_handshake(&alice_id, request).await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailure(_)));
        assert!(bob.peer_identity(&alice_id).await.unwrap().public_key.is_none());
    }

    #[tokio::test]
    async fn replayed_challenge_is_rejected() {
        let (_net, alice, bob) = pair();
        let alice_id = PeerId::from("alice");
        let challenge = alice.challenge();
        let request = HandshakeRequest {
            nonce: challenge.nonce,
            signature: challenge.signature,
            partner_key_url: "http://alice.test/public_key".into(),
            webhook_url: None,
            sender: Some("alice".into()),
        };
        bob.accept_handshake(&alice_id, request.clone()).await.unwrap();
        let err = bob.accept_handshake(&alice_id, request).await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailure(_)));
    }

    #[tokio::test]
    async fn ensure_authenticated_aborts_when_handshake_fails() {
        let (net, alice, _bob) = pair();
        let bob_id = PeerId::from("bob");
        net.route("http://bob.test/handshake", Route::Down);

        let err = alice.ensure_authenticated(&bob_id).await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(alice.peer_identity(&bob_id).await.unwrap().public_key.is_none());
        assert_eq!(
            alice.peer_state(&bob_id).await.unwrap(),
            HandshakeState::Unauthenticated
        );
    }

    #[tokio::test]
    async fn ensure_authenticated_aborts_when_key_fetch_fails() {
        let (net, alice, _bob) = pair();
        let bob_id = PeerId::from("bob");
        net.route("http://bob.test/public_key", Route::Down);

        // The handshake is acknowledged; only the key fetch fails.
        net.route("http://bob.test/handshake", Route::Sink);
        let err = alice.ensure_authenticated(&bob_id).await.unwrap_err();
        assert!(matches!(err, Error::KeyUnavailable(_)));
        assert!(alice.peer_identity(&bob_id).await.unwrap().public_key.is_none());
        assert_eq!(
            alice.peer_state(&bob_id).await.unwrap(),
            HandshakeState::Unauthenticated
        );
    }

    #[tokio::test]
    async fn concurrent_sends_share_one_handshake() {
        let (net, alice, _bob) = pair();
        let bob_id = PeerId::from("bob");
        let (a, b) = tokio::join!(
            alice.ensure_authenticated(&bob_id),
            alice.ensure_authenticated(&bob_id)
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(net.posts_to("http://bob.test/handshake").len(), 1);
    }

    #[tokio::test]
    async fn send_message_relays_decryptable_ciphertext() {
        let (net, alice, bob) = pair();
        let bob_id = PeerId::from("bob");
        let ciphertext = alice.send_message(&bob_id, "  oi, Bob!  ").await.unwrap();
        assert_eq!(bob.decrypt_incoming(&ciphertext).unwrap(), "oi, Bob!");

        let relayed = net.posts_to("http://bob.test/receive");
        assert_eq!(relayed.len(), 1);
        let message: EncryptedChatMessage = serde_json::from_value(relayed[0].clone()).unwrap();
        assert_eq!(message.text, ciphertext);
        assert_eq!(message.sender.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn empty_message_is_invalid_input() {
        let (net, alice, _bob) = pair();
        let err = alice
            .send_message(&PeerId::from("bob"), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(net.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn webhook_registration_validates_urls() {
        let (_net, alice, _bob) = pair();
        let bob_id = PeerId::from("bob");
        assert!(matches!(
            alice.register_webhook(&bob_id, "not-a-url").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(alice.peer_identity(&bob_id).await.unwrap().webhook_url.is_none());

        alice.register_webhook(&bob_id, "http://host/path").await.unwrap();
        assert_eq!(
            alice.peer_identity(&bob_id).await.unwrap().webhook_url.as_deref(),
            Some("http://host/path")
        );
    }

    #[test]
    fn url_validation() {
        assert!(validate_webhook_url("not-a-url").is_err());
        assert!(validate_webhook_url("").is_err());
        assert!(validate_webhook_url("mailto:bob@example.com").is_err());
        assert!(validate_webhook_url("http://host/path").is_ok());
        assert!(validate_webhook_url("https://localhost:5001/webhook_callback").is_ok());
    }

    #[tokio::test]
    async fn webhook_notification_is_signed_and_verifiable() {
        let (net, alice, bob) = pair();
        let alice_id = PeerId::from("alice");
        let bob_id = PeerId::from("bob");
        alice.ensure_authenticated(&bob_id).await.unwrap();

        // Bob learned alice's webhook during the handshake.
        bob.notify_webhook(&alice_id).await;
        let posted = net.posts_to("http://alice.test/webhook_callback");
        assert_eq!(posted.len(), 1);
        let notification: WebhookNotification =
            serde_json::from_value(posted[0].clone()).unwrap();
        assert_eq!(notification.event, NEW_MESSAGE_EVENT);
        assert_eq!(notification.sender, "bob");
        alice
            .verify_webhook_notification(&bob_id, &notification.signature)
            .await
            .unwrap();

        let forged = &notification.signature + 1u32;
        assert!(matches!(
            alice.verify_webhook_notification(&bob_id, &forged).await,
            Err(Error::AuthenticationFailure(_))
        ));
    }

    #[tokio::test]
    async fn webhook_callback_without_trusted_key_is_rejected() {
        let (_net, alice, _bob) = pair();
        let err = alice
            .verify_webhook_notification(&PeerId::from("bob"), &BigUint::from(1u32))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailure(_)));
    }

    #[tokio::test]
    async fn webhook_failures_are_swallowed() {
        let (net, alice, _bob) = pair();
        let bob_id = PeerId::from("bob");
        alice
            .register_webhook(&bob_id, "http://down.test/hook")
            .await
            .unwrap();
        net.route("http://down.test/hook", Route::Down);
        alice.notify_webhook(&bob_id).await;
        assert_eq!(net.posts_to("http://down.test/hook").len(), 1);
    }

    #[tokio::test]
    async fn unknown_sender_is_rejected() {
        let (_net, _alice, bob) = pair();
        assert!(matches!(
            bob.resolve_peer(Some("mallory")),
            Err(Error::AuthenticationFailure(_))
        ));
        assert_eq!(bob.resolve_peer(Some("alice")).unwrap(), PeerId::from("alice"));
    }
}
