//! Paillier-style additively-homomorphic public-key scheme over `Z_n^2`.
//!
//! `PublicKey` is `(n, g)` with the standard simplification `g = n + 1`.
//! `SecretKey` is `(lambda, mu)`, bound to exactly one `PublicKey` and
//! zeroized on drop.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::bigint::{mod_exp, mod_inverse, random_in_range};
use crate::error::{Error, Result};

/// `PK = (n, g)`. `container.rs` hand-serializes this field by field as
/// part of the wire format; there is no generic (de)serialization entry
/// point for it, so it derives no `serde` traits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    n: BigUint,
    n_squared: BigUint,
}

/// `SK = (lambda, mu)`. Zeroized on drop; never stored in a container.
///
/// `BigUint` does not implement `Zeroize` itself, so this writes over
/// `lambda`/`mu` by hand rather than deriving; best-effort only, as the
/// non-goals note this system makes no side-channel/memory-scrubbing
/// guarantees beyond this.
#[derive(Debug, Clone)]
pub struct SecretKey {
    n: BigUint,
    lambda: BigUint,
    mu: BigUint,
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.lambda = BigUint::zero();
        self.mu = BigUint::zero();
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// A ciphertext `c in [1, n^2)` with `gcd(c, n^2) = 1`.
pub type Ciphertext = BigUint;

/// A plaintext chunk `m in [0, n)`.
pub type Plaintext = BigUint;

impl PublicKey {
    pub fn from_n(n: BigUint) -> Self {
        let n_squared = &n * &n;
        Self { n, n_squared }
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    pub fn n_squared(&self) -> &BigUint {
        &self.n_squared
    }

    /// `g = n + 1`.
    pub fn g(&self) -> BigUint {
        &self.n + BigUint::one()
    }

    fn check_plaintext(&self, m: &BigUint) -> Result<()> {
        if m >= &self.n {
            return Err(Error::InvalidArgument(
                "plaintext must satisfy 0 <= m < n".into(),
            ));
        }
        Ok(())
    }

    fn check_ciphertext(&self, c: &BigUint) -> Result<()> {
        if c.is_zero() || c >= &self.n_squared || c.gcd(&self.n_squared) != BigUint::one() {
            return Err(Error::InvalidCiphertext);
        }
        Ok(())
    }

    /// Sample randomness `r` uniformly from `Z_n*` (rejecting non-coprime
    /// draws, which happen with negligible probability for RSA-scale `n`).
    pub fn sample_randomness(&self, rng: &mut (impl CryptoRng + RngCore)) -> BigUint {
        loop {
            let r = random_in_range(&BigUint::one(), &(&self.n - BigUint::one()), rng);
            if r.gcd(&self.n) == BigUint::one() {
                return r;
            }
        }
    }

    /// `Enc(m, r) = (1 + m*n) * r^n mod n^2`, the `g = n+1` simplification
    /// of `g^m * r^n mod n^2`.
    pub fn encrypt_with_randomness(&self, m: &BigUint, r: &BigUint) -> Result<Ciphertext> {
        self.check_plaintext(m)?;
        let one_plus_mn = (BigUint::one() + m * &self.n) % &self.n_squared;
        let r_to_n = mod_exp(r, &self.n, &self.n_squared);
        Ok((one_plus_mn * r_to_n) % &self.n_squared)
    }

    /// Encrypt with randomness sampled uniformly from `Z_n*`.
    pub fn encrypt(
        &self,
        m: &BigUint,
        rng: &mut (impl CryptoRng + RngCore),
    ) -> Result<(Ciphertext, BigUint)> {
        let r = self.sample_randomness(rng);
        let c = self.encrypt_with_randomness(m, &r)?;
        Ok((c, r))
    }

    /// `c1 * c2 mod n^2`; `Dec(add(Enc(m1), Enc(m2))) = (m1+m2) mod n`.
    pub fn add(&self, c1: &Ciphertext, c2: &Ciphertext) -> Result<Ciphertext> {
        self.check_ciphertext(c1)?;
        self.check_ciphertext(c2)?;
        Ok((c1 * c2) % &self.n_squared)
    }

    /// `c * g^a mod n^2` (`== c * (1 + a*n) mod n^2`); `Dec(add_const(c, a))
    /// = (m+a) mod n`.
    pub fn add_const(&self, c: &Ciphertext, a: &BigUint) -> Result<Ciphertext> {
        self.check_ciphertext(c)?;
        let a_mod = a % &self.n;
        let one_plus_an = (BigUint::one() + &a_mod * &self.n) % &self.n_squared;
        Ok((c * one_plus_an) % &self.n_squared)
    }

    /// `c^k mod n^2`; `Dec(mul_const(c, k)) = (m*k) mod n`.
    pub fn mul_const(&self, c: &Ciphertext, k: &BigUint) -> Result<Ciphertext> {
        self.check_ciphertext(c)?;
        Ok(mod_exp(c, k, &self.n_squared))
    }
}

impl SecretKey {
    pub fn from_lambda_mu(n: BigUint, lambda: BigUint, mu: BigUint) -> Self {
        Self { n, lambda, mu }
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    pub fn lambda(&self) -> &BigUint {
        &self.lambda
    }

    pub fn mu(&self) -> &BigUint {
        &self.mu
    }

    /// `L(u) = (u - 1) / n`, exact integer division.
    fn l_function(&self, u: &BigUint) -> BigUint {
        (u - BigUint::one()) / &self.n
    }

    /// `m = L(c^lambda mod n^2) * mu mod n`.
    pub fn decrypt(&self, pk: &PublicKey, c: &Ciphertext) -> Result<Plaintext> {
        if c.is_zero() || c >= pk.n_squared() || c.gcd(pk.n_squared()) != BigUint::one() {
            return Err(Error::InvalidCiphertext);
        }
        let u = mod_exp(c, &self.lambda, pk.n_squared());
        let l = self.l_function(&u);
        Ok((l * &self.mu) % &self.n)
    }
}

/// Computes `lambda = lcm(p-1, q-1)` and `mu = lambda^-1 mod n`.
pub fn derive_private_key(n: &BigUint, p: &BigUint, q: &BigUint) -> Result<SecretKey> {
    let p_minus_1 = p - BigUint::one();
    let q_minus_1 = q - BigUint::one();
    let lambda = p_minus_1.lcm(&q_minus_1);
    let mu = mod_inverse(&lambda, n)?;
    Ok(SecretKey::from_lambda_mu(n.clone(), lambda, mu))
}
