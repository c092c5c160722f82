// rsa_handshake_chat/shared_crypto/src/keygen.rs

//! RSA key pair derivation.
//!
//! Two primes are drawn uniformly from a configured range, then the modulus,
//! totient and private exponent are derived. A draw whose totient shares a
//! factor with `e` is thrown away entirely and a new pair of primes is drawn.

use std::fmt;

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::decimal;
use crate::primality::is_probably_prime;

/// Fixed public exponent.
pub const PUBLIC_EXPONENT: u32 = 65537;

/// Largest Unicode code point; `n` must exceed it to carry arbitrary text.
pub const MAX_CODE_POINT: u32 = 0x10FFFF;

/// Full derivations attempted before giving up.
pub const MAX_KEYGEN_ATTEMPTS: u32 = 64;

const MAX_PRIME_ATTEMPTS: u32 = 100_000;
const MAX_DISTINCT_REDRAWS: u32 = 1_000;

/// Inclusive range primes are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    min: u64,
    max: u64,
}

impl KeyRange {
    pub fn new(min: u64, max: u64) -> Result<Self> {
        if min < 2 {
            return Err(Error::InvalidInput(format!(
                "prime range must start at 2 or above, got {min}"
            )));
        }
        if min > max {
            return Err(Error::InvalidInput(format!(
                "empty prime range [{min}, {max}]"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self {
            min: 100_000,
            max: 500_000,
        }
    }
}

/// Public half `(e, n)`. Big integers travel as decimal strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    #[serde(with = "decimal")]
    pub e: BigUint,
    #[serde(with = "decimal")]
    pub n: BigUint,
}

/// Private half `(d, n)`. Deliberately not serializable.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    pub d: BigUint,
    pub n: BigUint,
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("d", &"[REDACTED]")
            .field("n", &self.n)
            .finish()
    }
}

/// A party's key pair, immutable once generated.
#[derive(Clone)]
pub struct KeyPair {
    public: PublicKey,
    private: PrivateKey,
    #[cfg_attr(not(test), allow(dead_code))]
    primes: (u64, u64),
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

impl KeyPair {
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn private(&self) -> &PrivateKey {
        &self.private
    }

    /// Whether every Unicode code point fits below the modulus.
    pub fn covers_unicode(&self) -> bool {
        self.public.n > BigUint::from(MAX_CODE_POINT)
    }

    #[cfg(test)]
    pub(crate) fn primes(&self) -> (u64, u64) {
        self.primes
    }

    #[cfg(test)]
    pub(crate) fn totient(&self) -> BigUint {
        let (p, q) = self.primes;
        BigUint::from(p - 1) * BigUint::from(q - 1)
    }
}

/// Generates a key pair using the thread-local RNG.
pub fn generate_key_pair(range: KeyRange) -> Result<KeyPair> {
    generate_key_pair_with_rng(&mut rand::thread_rng(), range)
}

/// Generates a key pair from the given RNG.
///
/// Retries are an explicit bounded loop; a pathological RNG ends in
/// [`Error::KeyGenerationExhausted`] rather than spinning forever.
pub fn generate_key_pair_with_rng<R: Rng>(
    rng: &mut R,
    range: KeyRange,
) -> Result<KeyPair> {
    for attempt in 1..=MAX_KEYGEN_ATTEMPTS {
        match derive_key_pair(rng, range) {
            Ok(pair) => {
                tracing::debug!(attempt, n = %pair.public.n, "RSA key pair generated");
                return Ok(pair);
            }
            Err(Error::ArithmeticInvariantViolation(reason)) => {
                tracing::debug!(attempt, %reason, "discarding primes and drawing again");
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::KeyGenerationExhausted {
        attempts: MAX_KEYGEN_ATTEMPTS,
    })
}

fn derive_key_pair<R: Rng>(rng: &mut R, range: KeyRange) -> Result<KeyPair> {
    let p = generate_prime(rng, range)?;
    let mut q = generate_prime(rng, range)?;
    let mut redraws = 0;
    while q == p {
        if redraws == MAX_DISTINCT_REDRAWS {
            return Err(Error::ArithmeticInvariantViolation(format!(
                "could not draw a second prime distinct from {p}"
            )));
        }
        q = generate_prime(rng, range)?;
        redraws += 1;
    }

    let n = BigUint::from(p) * BigUint::from(q);
    let phi = BigUint::from(p - 1) * BigUint::from(q - 1);
    let e = BigUint::from(PUBLIC_EXPONENT);

    let d = modinv(&e, &phi).ok_or_else(|| {
        Error::ArithmeticInvariantViolation(format!("e has no inverse modulo phi = {phi}"))
    })?;
    if (&e * &d) % &phi != BigUint::one() {
        return Err(Error::ArithmeticInvariantViolation(
            "e * d is not congruent to 1 modulo phi".into(),
        ));
    }

    Ok(KeyPair {
        public: PublicKey { e, n: n.clone() },
        private: PrivateKey { d, n },
        primes: (p, q),
    })
}

/// Draws uniformly from the range until a prime turns up.
pub fn generate_prime<R: Rng>(rng: &mut R, range: KeyRange) -> Result<u64> {
    for _ in 0..MAX_PRIME_ATTEMPTS {
        let candidate = rng.gen_range(range.min..=range.max);
        if is_probably_prime(candidate) {
            return Ok(candidate);
        }
    }
    Err(Error::InvalidInput(format!(
        "no prime found in [{}, {}] after {MAX_PRIME_ATTEMPTS} draws",
        range.min, range.max
    )))
}

/// Modular inverse of `a` modulo `m` via the iterative extended Euclid.
pub fn modinv(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    if m.is_zero() || m.is_one() {
        return None;
    }
    let m_signed = BigInt::from(m.clone());
    let (mut old_r, mut r) = (BigInt::from(a.clone()), m_signed.clone());
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());

    while !r.is_zero() {
        let quotient = &old_r / &r;
        let next_r = &old_r - &quotient * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &quotient * &s;
        old_s = std::mem::replace(&mut s, next_s);
    }

    if !old_r.is_one() {
        return None;
    }
    old_s.mod_floor(&m_signed).to_biguint()
}
