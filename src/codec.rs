//! Byte <-> chunked-integer codec, with length-equalising padding so the
//! two streams of a container are bit-length-identical.

use num_bigint::BigUint;
use rand::RngCore;

use crate::config::{CHUNK_SIZE_HEADROOM_BITS, CHUNK_SIZE_MAX, CHUNK_SIZE_MIN};
use crate::error::{Error, Result};

/// `B = floor((bitlen(n) - 128) / 8)`, clamped to `[16, 256]`.
pub fn chunk_size(n: &BigUint) -> usize {
    let bits = n.bits();
    let raw = bits.saturating_sub(CHUNK_SIZE_HEADROOM_BITS as u64) / 8;
    (raw as usize).clamp(CHUNK_SIZE_MIN, CHUNK_SIZE_MAX)
}

/// Split `bytes` into `chunk_size`-byte big-endian integer chunks, padding
/// the final chunk with random bytes to a full chunk. Returns the chunks
/// and the original (unpadded) byte length.
pub fn encode(
    bytes: &[u8],
    chunk_size: usize,
    rng: &mut impl RngCore,
) -> (Vec<BigUint>, usize) {
    let orig_len = bytes.len();
    if bytes.is_empty() {
        return (Vec::new(), 0);
    }

    let mut chunks = Vec::with_capacity(bytes.len().div_ceil(chunk_size));
    for raw in bytes.chunks(chunk_size) {
        if raw.len() == chunk_size {
            chunks.push(BigUint::from_bytes_be(raw));
        } else {
            let mut padded = vec![0u8; chunk_size];
            padded[..raw.len()].copy_from_slice(raw);
            rng.fill_bytes(&mut padded[raw.len()..]);
            chunks.push(BigUint::from_bytes_be(&padded));
        }
    }
    (chunks, orig_len)
}

/// Concatenate big-endian `chunk_size`-byte representations of each chunk,
/// truncated to `orig_len` bytes.
pub fn decode(chunks: &[BigUint], orig_len: usize, chunk_size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(chunks.len() * chunk_size);
    for m in chunks {
        let bytes = m.to_bytes_be();
        if bytes.len() > chunk_size {
            return Err(Error::InvalidArgument(
                "chunk value exceeds chunk_size bytes".into(),
            ));
        }
        let mut padded = vec![0u8; chunk_size];
        padded[chunk_size - bytes.len()..].copy_from_slice(&bytes);
        out.extend_from_slice(&padded);
    }
    if orig_len > out.len() {
        return Err(Error::InvalidArgument(
            "orig_len exceeds total decoded byte length".into(),
        ));
    }
    out.truncate(orig_len);
    Ok(out)
}

/// Encode `orig_len` itself as a single length-prefix chunk (placed as the
/// first chunk of a stream rather than leaked in the container header).
pub fn encode_length_chunk(orig_len: usize) -> BigUint {
    BigUint::from(orig_len as u64)
}

/// Decode a length-prefix chunk back to a byte count.
pub fn decode_length_chunk(chunk: &BigUint, chunk_size: usize) -> Result<usize> {
    use num_traits::ToPrimitive;
    let max_len = (chunk_size as u64).saturating_mul(u32::MAX as u64);
    let value = chunk.to_u64().ok_or(Error::KeyMismatch)?;
    if value > max_len {
        return Err(Error::KeyMismatch);
    }
    Ok(value as usize)
}
