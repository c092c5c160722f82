// rsa_handshake_chat/shared_crypto/src/error.rs

//! Error types shared by the RSA core and the handshake coordinator.

use thiserror::Error;

/// Result type alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by key generation, the cipher, signatures and the handshake.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller supplied something unusable (empty message, malformed URL, bad range).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A signature did not verify against the expected public key.
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    /// The peer's public key is not known and could not be obtained.
    #[error("Public key unavailable: {0}")]
    KeyUnavailable(String),

    /// Timeout, refused connection or non-2xx response from a remote call.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The modular inverse of `e` does not exist for the drawn primes.
    ///
    /// Only used inside key generation, where it triggers a fresh draw.
    #[error("Arithmetic invariant violated: {0}")]
    ArithmeticInvariantViolation(String),

    /// Key generation gave up after the bounded number of attempts.
    #[error("Key generation exhausted after {attempts} attempts")]
    KeyGenerationExhausted { attempts: u32 },

    /// A decrypted value is not a Unicode scalar value.
    #[error("Decrypted value {0} is not a valid code point")]
    InvalidCodePoint(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Timeouts and connection failures are treated alike as recoverable;
    /// the caller decides whether to try again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TransportFailure(_))
    }
}
