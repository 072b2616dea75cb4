//! Key-routing predicate: maps a caller key and a container's salt to a
//! stream label `{0, 1}`, deterministically, in balanced proportion, and
//! without branching on secret data.
//!
//! Neither stream is "true" or "false" to this function — the caller
//! decides at encrypt time which plaintext sits at position 0 versus 1.
//! `route` only ever tells the decrypt path which stream a given key
//! reaches; it carries no notion of which one was "intended".

use subtle::{Choice, ConditionallySelectable};

use crate::config::HKDF_INFO_THRESHOLD;
use crate::kdf::hmac_sha256;

/// Constant-time `a < b` for `u32` operands: computed via the sign bit of
/// a widened subtraction, never via a comparison operator that a compiler
/// or CPU could turn into a data-dependent branch.
fn ct_lt_u32(a: u32, b: u32) -> Choice {
    let diff = (a as i64) - (b as i64);
    Choice::from(((diff >> 63) & 1) as u8)
}

fn ct_ge_u32(a: u32, b: u32) -> Choice {
    !ct_lt_u32(a, b)
}

/// `route(K, salt) -> label in {0, 1}`.
///
/// Both input features are always computed and both comparisons are
/// always evaluated (via [`ct_lt_u32`]/[`ct_ge_u32`]); the final label is
/// combined with XOR, never with `if`/`&&` short-circuiting, so execution
/// time does not depend on the key or the resulting label.
pub fn route(key: &[u8], salt: &[u8; 16]) -> u8 {
    let h = hmac_sha256(salt, key);

    let v1 = u32::from_be_bytes([h[0], h[1], h[2], h[3]]);
    let v2 = u32::from_be_bytes([h[4], h[5], h[6], h[7]]);
    let w: u32 = h[0..16].iter().map(|b| b.count_ones()).sum();

    let f1 = ((v1 ^ (v1 >> 4)) & 0xff) as u32;
    let f2 = ((v2 ^ (v2 >> 2)) & 0xff) as u32;
    let f3 = Choice::from((w & 1) as u8);

    let t = hmac_sha256(salt, HKDF_INFO_THRESHOLD)[0] as u32;

    let feature_a = ct_lt_u32(f1, t);
    let feature_b = ct_ge_u32(f2, 128);

    let label_choice = feature_a ^ feature_b ^ f3;
    u8::conditional_select(&0u8, &1u8, label_choice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    #[test]
    fn route_is_deterministic() {
        let salt = [9u8; 16];
        let key = b"a sample caller key of arbitrary length";
        assert_eq!(route(key, &salt), route(key, &salt));
    }

    #[test]
    fn route_is_balanced_over_random_keys() {
        let mut rng = rand::thread_rng();
        let salt = [5u8; 16];
        let trials = 10_000;
        let mut zeros = 0u32;
        for _ in 0..trials {
            let mut key = [0u8; 32];
            rng.fill_bytes(&mut key);
            if route(&key, &salt) == 0 {
                zeros += 1;
            }
        }
        let frac = zeros as f64 / trials as f64;
        assert!((frac - 0.5).abs() < 0.02, "fraction of label 0 = {frac}");
    }

    #[test]
    fn different_salts_can_route_a_fixed_key_differently() {
        // Not a universal property (the function is deterministic per
        // salt), but with 256 distinct salts at least one flips the label
        // relative to salt zero for a fixed key, confirming salt binding.
        let key = b"fixed-key-material";
        let base = route(key, &[0u8; 16]);
        let mut saw_other = false;
        for s in 1u8..=255 {
            let salt = [s; 16];
            if route(key, &salt) != base {
                saw_other = true;
                break;
            }
        }
        assert!(saw_other);
    }

    #[test]
    fn two_keys_can_be_found_that_route_to_different_labels() {
        let salt = [1u8; 16];
        let mut rng = rand::thread_rng();
        let mut found = (false, false);
        for _ in 0..1000 {
            let mut key = [0u8; 32];
            rng.fill_bytes(&mut key);
            match route(&key, &salt) {
                0 => found.0 = true,
                _ => found.1 = true,
            }
            if found.0 && found.1 {
                break;
            }
        }
        assert!(found.0 && found.1);
    }
}
