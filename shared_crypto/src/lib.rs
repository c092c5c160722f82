// rsa_handshake_chat/shared_crypto/src/lib.rs

// Library module declarations.
pub mod cipher;
pub mod error;
pub mod handshake;
pub mod keygen;
pub mod models;
pub mod primality;
pub mod signature;
pub mod transport;

// Main public items re-exported for the applications.
pub use cipher::{decrypt, encrypt, Ciphertext};
pub use error::{Error, Result};
pub use handshake::{
    validate_webhook_url, Challenge, HandshakeCoordinator, HandshakeState, LocalEndpoints,
    PeerConfig, PeerId, PeerIdentity,
};
pub use keygen::{generate_key_pair, KeyPair, KeyRange, PrivateKey, PublicKey};
pub use models::{
    EncryptedChatMessage, HandshakeRequest, RegisterWebhookRequest, StatusResponse,
    WebhookCallback, WebhookNotification,
};
pub use primality::is_probably_prime;
pub use signature::{sign, verify};
pub use transport::{PeerTransport, Timeouts};
