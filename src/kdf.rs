//! Shared key-derivation helpers: HKDF-SHA256 expansion and plain
//! HMAC-SHA256, used by mask derivation, the key router, and container
//! integrity tagging.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// HKDF-SHA256 with `ikm` as input keying material and no extra salt,
/// expanded against `info` to `out_len` bytes. Used wherever the spec
/// calls for `HKDF-Expand(key_material, tag, len)`: treating `key_material`
/// as the IKM (rather than requiring callers to hand us an already-valid
/// pseudorandom key of hash-length) keeps this usable with short values
/// such as the container's 16-byte salt.
pub fn hkdf_expand(ikm: &[u8], info: &[u8], out_len: usize) -> Vec<u8> {
    let hk = Hkdf::<Sha256>::new(None, ikm);
    let mut out = vec![0u8; out_len];
    hk.expand(info, &mut out)
        .expect("hkdf output length is bounded by 255 * hash length");
    out
}

/// HKDF-SHA256 expanded to exactly 32 bytes.
pub fn hkdf_expand_32(ikm: &[u8], info: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hkdf_expand(ikm, info, 32));
    out
}

/// `HMAC-SHA256(key, message)`.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}
