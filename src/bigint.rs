//! Arbitrary-precision integers and the modular arithmetic built on top of
//! them: modular exponentiation, extended Euclid (GCD and modular inverse),
//! and a Miller-Rabin primality test with caller-controlled rounds and
//! caller-supplied randomness.
//!
//! The `num-bigint` crate supplies the underlying integer representation
//! and its primitive operations (add/sub/mul/div/rem, comparison); this
//! module builds the higher-level number-theoretic operations the rest of
//! the crate needs on top of it.

use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};

use crate::error::{Error, Result};

/// Right-to-left square-and-multiply modular exponentiation: `base^exp mod
/// modulus`.
pub fn mod_exp(base: &BigUint, exp: &BigUint, modulus: &BigUint) -> BigUint {
    if modulus.is_one() {
        return BigUint::zero();
    }

    let mut result = BigUint::one();
    let mut base = base % modulus;
    let mut exp = exp.clone();

    while !exp.is_zero() {
        if exp.bit(0) {
            result = (&result * &base) % modulus;
        }
        exp >>= 1;
        base = (&base * &base) % modulus;
    }

    result
}

/// Extended Euclidean algorithm. Returns `(g, x, y)` such that `a*x + b*y =
/// g = gcd(a, b)`.
pub fn extended_gcd(a: &BigInt, b: &BigInt) -> (BigInt, BigInt, BigInt) {
    let (mut old_r, mut r) = (a.clone(), b.clone());
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());
    let (mut old_t, mut t) = (BigInt::zero(), BigInt::one());

    while !r.is_zero() {
        let quotient = &old_r / &r;

        let new_r = &old_r - &quotient * &r;
        old_r = std::mem::replace(&mut r, new_r);

        let new_s = &old_s - &quotient * &s;
        old_s = std::mem::replace(&mut s, new_s);

        let new_t = &old_t - &quotient * &t;
        old_t = std::mem::replace(&mut t, new_t);
    }

    (old_r, old_s, old_t)
}

/// `gcd(a, b)` for non-negative integers.
pub fn gcd(a: &BigUint, b: &BigUint) -> BigUint {
    a.gcd(b)
}

/// `a^-1 mod m`. Fails with `Error::NotCoprime` unless `gcd(a, m) == 1`.
///
/// Built on the extended-Euclid loop above, whose quotient sequence (and
/// hence iteration count) depends on the values of `a` and `m`, not just
/// their bit lengths — this is not a constant-time or value-independent
/// inverse. The non-goals this crate carries already disclaim side-channel
/// resistance beyond the specific constant-time primitives called out
/// elsewhere (routing, tag comparison, length-chunk validation), and this
/// function is not one of them.
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Result<BigUint> {
    if m.is_zero() {
        return Err(Error::InvalidArgument("modulus must be non-zero".into()));
    }

    let a_signed = BigInt::from_biguint(Sign::Plus, a.clone());
    let m_signed = BigInt::from_biguint(Sign::Plus, m.clone());

    let (g, x, _) = extended_gcd(&a_signed, &m_signed);
    if g != BigInt::one() && g != -BigInt::one() {
        return Err(Error::NotCoprime);
    }

    let x_mod = x.mod_floor(&m_signed);
    let (sign, mag) = x_mod.into_parts();
    debug_assert_ne!(sign, Sign::Minus);
    Ok(mag)
}

/// Miller-Rabin primality test.
///
/// `rounds` independent witnesses are drawn from `rng`; the probability
/// that a composite is reported prime is below `4^-rounds`. Witness bytes
/// are drawn from `rng` uniformly and rejected-and-resampled when they
/// fall outside `[2, n-2]`, so the number of bytes consumed from `rng` is
/// not fixed in advance (this function is not used anywhere that requires
/// deterministic RNG byte-consumption; `primegen` handles that separately).
pub fn is_probably_prime(
    n: &BigUint,
    rounds: u32,
    rng: &mut (impl CryptoRng + RngCore),
) -> bool {
    let small_primes: [u64; 15] = [
        2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47,
    ];

    if n < &BigUint::from(2u32) {
        return false;
    }
    for p in small_primes {
        let p = BigUint::from(p);
        if n == &p {
            return true;
        }
        if (n % &p).is_zero() {
            return false;
        }
    }

    // write n - 1 = 2^s * d with d odd
    let one = BigUint::one();
    let n_minus_one = n - &one;
    let mut d = n_minus_one.clone();
    let mut s = 0u32;
    while (&d & &one).is_zero() {
        d >>= 1;
        s += 1;
    }

    let n_minus_two = n - BigUint::from(2u32);

    'witness: for _ in 0..rounds {
        let a = random_in_range(&BigUint::from(2u32), &n_minus_two, rng);
        let mut x = mod_exp(&a, &d, n);

        if x == one || x == n_minus_one {
            continue;
        }

        for _ in 0..s.saturating_sub(1) {
            x = mod_exp(&x, &BigUint::from(2u32), n);
            if x == n_minus_one {
                continue 'witness;
            }
        }

        return false;
    }

    true
}

/// Draw a uniform random integer in `[lo, hi]` inclusive using rejection
/// sampling over the bit length of `hi`.
pub fn random_in_range(
    lo: &BigUint,
    hi: &BigUint,
    rng: &mut (impl CryptoRng + RngCore),
) -> BigUint {
    if lo > hi {
        return lo.clone();
    }
    let span = hi - lo + 1u32;
    let bits = span.bits();
    loop {
        let candidate = random_bits(bits as usize, rng);
        if candidate < span {
            return lo + candidate;
        }
    }
}

/// Draw a uniform random non-negative integer with exactly `bits` bits of
/// entropy (i.e. in `[0, 2^bits)`), reading bytes from `rng` big-endian.
pub fn random_bits(bits: usize, rng: &mut (impl CryptoRng + RngCore)) -> BigUint {
    if bits == 0 {
        return BigUint::zero();
    }
    let n_bytes = bits.div_ceil(8);
    let mut buf = vec![0u8; n_bytes];
    rng.fill_bytes(&mut buf);

    let extra_bits = n_bytes * 8 - bits;
    if extra_bits > 0 {
        buf[0] &= 0xff >> extra_bits;
    }
    BigUint::from_bytes_be(&buf)
}
