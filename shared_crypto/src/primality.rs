// rsa_handshake_chat/shared_crypto/src/primality.rs

//! Miller-Rabin primality testing over 64-bit integers.
//!
//! The witness set below is deterministic for every `u64`, so the test is
//! exact on its whole domain. Candidates wider than 64 bits are not accepted
//! by the type, which is how callers stay inside the proven range.

/// Small primes used for trial division before Miller-Rabin.
const SMALL_PRIMES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Witness bases known to be deterministic for all 64-bit integers.
const WITNESSES: [u64; 7] = [2, 325, 9375, 28178, 450775, 9780504, 1795265022];

/// Returns `true` when `num` is prime.
pub fn is_probably_prime(num: u64) -> bool {
    if num < 2 {
        return false;
    }
    for &p in &SMALL_PRIMES {
        if num % p == 0 {
            return num == p;
        }
    }

    let n_minus_one = num - 1;
    let s = n_minus_one.trailing_zeros();
    let d = n_minus_one >> s;

    'witness: for &a in &WITNESSES {
        if a >= num {
            continue;
        }
        let mut x = pow_mod(a, d, num);
        if x == 1 || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, num);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut result = 1 % m;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, m);
        }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    result
}
