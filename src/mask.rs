//! The homomorphic linear mask: `Mask(c) = add_const(mul_const(c, k), a)`,
//! so that `Dec(Mask(Enc(m))) = m*k + a mod n`, with a matching inverse.
//!
//! Only this linear variant is implemented. The source lineage this system
//! is drawn from also contains a polynomial ("advanced") mask applying
//! `a*c^2 + b*c + d`; squaring a Paillier ciphertext is not homomorphic
//! under the additive scheme (`mul_const` only multiplies the plaintext by
//! a *known* constant, it cannot multiply two encrypted values together),
//! so that variant's "simplified approach" silently collapses to
//! `(a+b)*x` instead of the polynomial it claims to compute. It is
//! intentionally not implemented here — the linear mask above is sufficient
//! for every property this crate guarantees.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::One;

use crate::kdf::hkdf_expand;
use crate::paillier::{Ciphertext, PublicKey};

/// Bits of headroom added above `bitlen(n)` before reducing a KDF output
/// modulo `n`, so the reduction doesn't measurably bias toward small
/// values (distilled spec §9, "bigint from bytes" pitfall).
const MASK_DERIVATION_HEADROOM_BITS: u64 = 128;

/// `M = (k, a, seed)`. `k` is the multiplicative factor (`gcd(k, n) = 1`),
/// `a` the additive offset, `seed` the 32 bytes both were derived from.
/// Serialized field-by-field by `container.rs`'s hand-rolled wire format,
/// not via `serde`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub k: BigUint,
    pub a: BigUint,
    pub seed: [u8; 32],
}

/// `sub_seed(salt, tag) = HKDF-Expand(salt, tag, 32)`, binding a
/// stream-specific mask seed to the container's single salt while keeping
/// the two streams' masks pairwise independent.
pub fn derive_stream_seed(salt: &[u8], tag: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hkdf_expand(salt, tag, 32));
    out
}

/// Derive `(k, a)` from a 32-byte seed and public modulus `n`.
pub fn derive_mask(seed: &[u8; 32], n: &BigUint) -> Mask {
    let out_bits = n.bits() + MASK_DERIVATION_HEADROOM_BITS;
    let out_len = (out_bits as usize).div_ceil(8);

    let h1 = hkdf_expand(seed, &[0x00], out_len);
    let a = BigUint::from_bytes_be(&h1) % n;

    let n_minus_1 = n - BigUint::one();
    let h2 = hkdf_expand(seed, &[0x01], out_len);
    let mut k = (BigUint::from_bytes_be(&h2) % &n_minus_1) + BigUint::one();

    // Bounded by a handful of iterations with overwhelming probability for
    // cryptographic n; cap generously rather than loop forever.
    for _ in 0..64 {
        if k.gcd(n) == BigUint::one() {
            break;
        }
        k += BigUint::one();
        if k >= *n {
            k = BigUint::one();
        }
    }

    Mask {
        k,
        a,
        seed: *seed,
    }
}

/// `Mask(c) = add_const(mul_const(c, k), a)`.
pub fn apply(pk: &PublicKey, c: &Ciphertext, mask: &Mask) -> crate::error::Result<Ciphertext> {
    let scaled = pk.mul_const(c, &mask.k)?;
    pk.add_const(&scaled, &mask.a)
}

/// `Unmask(c) = mul_const(add_const(c, -a mod n), k^-1 mod n)`.
pub fn remove(pk: &PublicKey, c: &Ciphertext, mask: &Mask) -> crate::error::Result<Ciphertext> {
    let neg_a = (pk.n() - (&mask.a % pk.n())) % pk.n();
    let shifted = pk.add_const(c, &neg_a)?;
    let k_inv = crate::bigint::mod_inverse(&mask.k, pk.n())?;
    pk.mul_const(&shifted, &k_inv)
}

/// Apply a mask to every ciphertext in `chunks`, preserving order.
pub fn apply_batch(
    pk: &PublicKey,
    chunks: &[Ciphertext],
    mask: &Mask,
) -> crate::error::Result<Vec<Ciphertext>> {
    chunks.iter().map(|c| apply(pk, c, mask)).collect()
}

/// Remove a mask from every ciphertext in `chunks`, preserving order.
pub fn remove_batch(
    pk: &PublicKey,
    chunks: &[Ciphertext],
    mask: &Mask,
) -> crate::error::Result<Vec<Ciphertext>> {
    chunks.iter().map(|c| remove(pk, c, mask)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primegen::generate_keypair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn keypair() -> (PublicKey, crate::paillier::SecretKey) {
        let mut rng = ChaCha20Rng::from_seed([21u8; 32]);
        generate_keypair(256, 40, &mut rng, None).unwrap()
    }

    #[test]
    fn mask_round_trips_through_ciphertext() {
        let (pk, sk) = keypair();
        let mut rng = ChaCha20Rng::from_seed([22u8; 32]);
        let seed = [77u8; 32];
        let mask = derive_mask(&seed, pk.n());

        let m = BigUint::from(99u32);
        let (c, _) = pk.encrypt(&m, &mut rng).unwrap();
        let masked = apply(&pk, &c, &mask).unwrap();
        let unmasked = remove(&pk, &masked, &mask).unwrap();

        assert_eq!(sk.decrypt(&pk, &unmasked).unwrap(), m);
    }

    #[test]
    fn mask_is_deterministic_from_seed() {
        let (pk, _sk) = keypair();
        let seed = [3u8; 32];
        assert_eq!(derive_mask(&seed, pk.n()), derive_mask(&seed, pk.n()));
    }

    #[test]
    fn two_stream_seeds_from_one_salt_are_independent() {
        let salt = b"0123456789abcdef";
        let s0 = derive_stream_seed(salt, b"stream0");
        let s1 = derive_stream_seed(salt, b"stream1");
        assert_ne!(s0, s1);
    }

    #[test]
    fn batch_apply_remove_preserves_order_and_length() {
        let (pk, sk) = keypair();
        let mut rng = ChaCha20Rng::from_seed([23u8; 32]);
        let mask = derive_mask(&[9u8; 32], pk.n());

        let msgs: Vec<BigUint> = (0..5u32).map(BigUint::from).collect();
        let cts: Vec<Ciphertext> = msgs
            .iter()
            .map(|m| pk.encrypt(m, &mut rng).unwrap().0)
            .collect();

        let masked = apply_batch(&pk, &cts, &mask).unwrap();
        let unmasked = remove_batch(&pk, &masked, &mask).unwrap();
        assert_eq!(unmasked.len(), msgs.len());

        for (m, c) in msgs.iter().zip(unmasked.iter()) {
            assert_eq!(&sk.decrypt(&pk, c).unwrap(), m);
        }
    }
}
