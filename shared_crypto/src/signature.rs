// rsa_handshake_chat/shared_crypto/src/signature.rs

//! Raw RSA signatures over short messages.
//!
//! The message bytes are read as one big-endian integer `m`. Nothing is
//! hashed or padded, so only messages with `m < n` (short nonces, fixed event
//! names under large enough keys) give a meaningful proof. Longer messages
//! are reduced modulo `n` on both sides and still verify arithmetically.

use num_bigint::BigUint;
use rand::Rng;

use crate::keygen::{PrivateKey, PublicKey};

/// Big-endian integer value of the message bytes.
pub fn message_integer(message: &str) -> BigUint {
    BigUint::from_bytes_be(message.as_bytes())
}

/// Whether `message` is short enough to be signed soundly under `n`.
pub fn fits_modulus(message: &str, n: &BigUint) -> bool {
    &message_integer(message) < n
}

/// Computes `m^d mod n`.
pub fn sign(message: &str, key: &PrivateKey) -> BigUint {
    message_integer(message).modpow(&key.d, &key.n)
}

/// Checks that `signature^e mod n` equals the message integer reduced mod `n`.
///
/// This is looser than the textbook `signature^e mod n == m`: for a message
/// with `m >= n` any signature over its residue is accepted. Signatures
/// `>= n` are rejected outright, which textbook verification would not do.
pub fn verify(signature: &BigUint, message: &str, key: &PublicKey) -> bool {
    if signature >= &key.n {
        return false;
    }
    let recovered = signature.modpow(&key.e, &key.n);
    recovered == message_integer(message) % &key.n
}

/// Lowest and highest nonce digit counts.
const MIN_NONCE_DIGITS: usize = 4;
const MAX_NONCE_DIGITS: usize = 18;

/// Draws a decimal nonce whose byte-integer stays below `n`.
///
/// Nonces are at least four digits (1000..=9999) and grow with the modulus,
/// one ASCII digit per full byte of headroom.
pub fn generate_nonce<R: Rng>(rng: &mut R, n: &BigUint) -> String {
    let capacity = (n.bits().saturating_sub(1) / 8) as usize;
    let digits = capacity.clamp(MIN_NONCE_DIGITS, MAX_NONCE_DIGITS);
    let mut nonce = String::with_capacity(digits);
    nonce.push(char::from(b'0' + rng.gen_range(1..=9)));
    for _ in 1..digits {
        nonce.push(char::from(b'0' + rng.gen_range(0..=9)));
    }
    nonce
}
