//! Prime generation, both randomized (`generate_keypair`) and deterministic
//! from a passphrase (`derive_keypair`).

use hkdf::Hkdf;
use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::Sha256;

use crate::bigint::{is_probably_prime, random_bits};
use crate::error::{Error, Result};
use crate::paillier::{derive_private_key, PublicKey, SecretKey};

/// Small primes used to sieve candidates before paying for Miller-Rabin.
const SMALL_PRIME_BOUND: u32 = 2000;

fn small_primes() -> Vec<u32> {
    let mut is_composite = vec![false; SMALL_PRIME_BOUND as usize];
    let mut primes = Vec::new();
    for i in 2..SMALL_PRIME_BOUND as usize {
        if is_composite[i] {
            continue;
        }
        primes.push(i as u32);
        let mut j = i * i;
        while j < SMALL_PRIME_BOUND as usize {
            is_composite[j] = true;
            j += i;
        }
    }
    primes
}

/// Returns `true` if `n` shares a small factor with the sieve, i.e. is
/// cheaply known-composite.
fn fails_small_prime_sieve(n: &BigUint, primes: &[u32]) -> bool {
    for &p in primes {
        let p_big = BigUint::from(p);
        if n == &p_big {
            return false;
        }
        if (n % &p_big).is_zero() {
            return true;
        }
    }
    false
}

/// Generate an odd `bits`-bit integer (high bit set) that passes
/// Miller-Rabin with `rounds` witnesses drawn from `rng`.
///
/// Rejection loop: sample `bits` random bits, force the top and bottom bit,
/// sieve by small primes, run Miller-Rabin. Each iteration consumes exactly
/// `ceil(bits/8)` bytes from `rng` for the candidate, plus whatever
/// Miller-Rabin consumes for witnesses on candidates that pass the sieve —
/// this fixed, left-to-right consumption order is what makes
/// `derive_keypair` reproducible for a given seed.
pub fn generate_prime(
    bits: u32,
    rounds: u32,
    rng: &mut (impl CryptoRng + RngCore),
    cancel: Option<&dyn Fn() -> bool>,
) -> Result<BigUint> {
    if bits < 2 {
        return Err(Error::InvalidArgument(
            "prime bit length must be at least 2".into(),
        ));
    }

    let primes = small_primes();
    let top_bit = bits as usize - 1;

    loop {
        if let Some(keep_going) = cancel {
            if !keep_going() {
                return Err(Error::Cancelled);
            }
        }

        let mut candidate = random_bits(bits as usize, rng);
        candidate.set_bit(top_bit as u64, true);
        candidate.set_bit(0, true);

        if fails_small_prime_sieve(&candidate, &primes) {
            continue;
        }
        if is_probably_prime(&candidate, rounds, rng) {
            return Ok(candidate);
        }
    }
}

/// Generate a Paillier keypair from two `bits/2`-bit primes, rejecting
/// pairs that are equal or too close together (Fermat-factorization
/// resistance: `|p - q| >= 2^(bits/2 - 100)`).
pub fn generate_keypair(
    bits: u32,
    rounds: u32,
    rng: &mut (impl CryptoRng + RngCore),
    cancel: Option<&dyn Fn() -> bool>,
) -> Result<(PublicKey, SecretKey)> {
    if bits < 256 || bits % 2 != 0 {
        return Err(Error::InvalidArgument(
            "key bit length must be even and at least 256".into(),
        ));
    }
    let half = bits / 2;
    let min_gap_bits = half.saturating_sub(100);
    let min_gap = if min_gap_bits == 0 {
        BigUint::zero()
    } else {
        BigUint::one() << (min_gap_bits as usize)
    };

    loop {
        let p = generate_prime(half, rounds, rng, cancel)?;
        let q = generate_prime(half, rounds, rng, cancel)?;

        if p == q {
            continue;
        }
        let diff = if p > q { &p - &q } else { &q - &p };
        if diff < min_gap {
            continue;
        }

        let n = &p * &q;
        if n.gcd(&((&p - 1u32) * (&q - 1u32))) != BigUint::one() {
            continue;
        }

        let pk = PublicKey::from_n(n.clone());
        let sk = derive_private_key(&n, &p, &q)?;
        return Ok((pk, sk));
    }
}

/// Derive a Paillier keypair deterministically from `(passphrase, salt,
/// bits)`: same inputs always produce the same keypair, byte-for-byte.
///
/// The passphrase and salt are fed through HKDF-SHA256 to seed a
/// `ChaCha20Rng`, which then drives the exact same rejection loop as
/// [`generate_keypair`]. Determinism therefore follows from the RNG seed
/// alone; no additional bookkeeping is required.
pub fn derive_keypair(
    passphrase: &[u8],
    salt: &[u8],
    bits: u32,
) -> Result<(PublicKey, SecretKey)> {
    derive_keypair_with_rounds(passphrase, salt, bits, crate::config::DEFAULT_MILLER_RABIN_ROUNDS)
}

pub fn derive_keypair_with_rounds(
    passphrase: &[u8],
    salt: &[u8],
    bits: u32,
    rounds: u32,
) -> Result<(PublicKey, SecretKey)> {
    let hk = Hkdf::<Sha256>::new(Some(salt), passphrase);
    let mut seed = [0u8; 32];
    hk.expand(b"dualcrypt-keygen-prf", &mut seed)
        .map_err(|_| Error::RngFailure)?;

    let mut rng = ChaCha20Rng::from_seed(seed);
    generate_keypair(bits, rounds, &mut rng, None)
}
