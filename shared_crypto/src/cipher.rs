// rsa_handshake_chat/shared_crypto/src/cipher.rs

//! Textbook RSA applied one code point at a time.
//!
//! There is no padding and no randomization: a symbol always maps to the
//! same ciphertext value under a given key. Output order follows input order
//! and ciphertext length equals the number of code points.

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::keygen::{PrivateKey, PublicKey};
use crate::models::decimal;

/// One ciphertext value per plaintext symbol, each in `[0, n)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ciphertext(Vec<BigUint>);

impl Ciphertext {
    pub fn new(values: Vec<BigUint>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[BigUint] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

struct Element<'a>(&'a BigUint);

impl Serialize for Element<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        decimal::serialize(self.0, serializer)
    }
}

#[derive(Deserialize)]
#[serde(transparent)]
struct OwnedElement(#[serde(with = "decimal")] BigUint);

impl Serialize for Ciphertext {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(Element))
    }
}

impl<'de> Deserialize<'de> for Ciphertext {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let elements = Vec::<OwnedElement>::deserialize(deserializer)?;
        Ok(Self(elements.into_iter().map(|e| e.0).collect()))
    }
}

/// Encrypts each code point `c` as `c^e mod n`.
///
/// A code point that does not fit below `n` is rejected; the raw scheme
/// would silently corrupt it.
pub fn encrypt(plaintext: &str, key: &PublicKey) -> Result<Ciphertext> {
    let mut values = Vec::with_capacity(plaintext.chars().count());
    for ch in plaintext.chars() {
        let code = BigUint::from(ch as u32);
        if code >= key.n {
            return Err(Error::InvalidInput(format!(
                "code point U+{:04X} does not fit below modulus {}",
                ch as u32, key.n
            )));
        }
        let encrypted = code.modpow(&key.e, &key.n);
        tracing::trace!(symbol = %ch, code_point = ch as u32, %encrypted, "encrypted symbol");
        values.push(encrypted);
    }
    Ok(Ciphertext(values))
}

/// Decrypts each value `v` as `v^d mod n` and reads it back as a code point.
///
/// Values produced under another key decrypt to arbitrary numbers; those
/// that are not Unicode scalar values fail with [`Error::InvalidCodePoint`].
pub fn decrypt(ciphertext: &Ciphertext, key: &PrivateKey) -> Result<String> {
    let mut plaintext = String::with_capacity(ciphertext.len());
    for value in ciphertext.values() {
        let decrypted = value.modpow(&key.d, &key.n);
        let ch = decrypted
            .to_u32()
            .and_then(char::from_u32)
            .ok_or_else(|| Error::InvalidCodePoint(decrypted.to_string()))?;
        tracing::trace!(%value, code_point = ch as u32, "decrypted symbol");
        plaintext.push(ch);
    }
    Ok(plaintext)
}
