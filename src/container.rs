//! The on-wire container format: two masked ciphertext streams, the public
//! key, mask metadata, salt and an integrity tag, serialised to an exact
//! byte layout (not a generic `serde`/`bincode` blob — this format is part
//! of the contract, offset for offset).

use num_bigint::BigUint;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};
use crate::kdf::hmac_sha256;
use crate::mask::Mask;
use crate::paillier::{Ciphertext, PublicKey};

const MAGIC: u16 = 0xC0DE;
pub const VERSION: u16 = 1;
pub const FLAG_PASSPHRASE_DERIVED: u32 = 1 << 0;

pub struct Container {
    pub version: u16,
    pub flags: u32,
    pub pk: PublicKey,
    pub salt: [u8; 16],
    pub chunk_size: u16,
    pub stream_count: u32,
    pub stream_0: Vec<Ciphertext>,
    pub stream_1: Vec<Ciphertext>,
    pub mask_0: Mask,
    pub mask_1: Mask,
}

fn push_len_prefixed_u16(out: &mut Vec<u8>, bytes: &[u8]) {
    let len: u16 = bytes
        .len()
        .try_into()
        .expect("field exceeds u16 length prefix");
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
}

fn read_len_prefixed_u16<'a>(buf: &'a [u8], cursor: &mut usize) -> Result<&'a [u8]> {
    let len = read_u16(buf, cursor)? as usize;
    let field = buf
        .get(*cursor..*cursor + len)
        .ok_or(Error::CorruptContainer)?;
    *cursor += len;
    Ok(field)
}

fn read_u16(buf: &[u8], cursor: &mut usize) -> Result<u16> {
    let bytes: [u8; 2] = buf
        .get(*cursor..*cursor + 2)
        .ok_or(Error::CorruptContainer)?
        .try_into()
        .map_err(|_| Error::CorruptContainer)?;
    *cursor += 2;
    Ok(u16::from_be_bytes(bytes))
}

fn read_u32(buf: &[u8], cursor: &mut usize) -> Result<u32> {
    let bytes: [u8; 4] = buf
        .get(*cursor..*cursor + 4)
        .ok_or(Error::CorruptContainer)?
        .try_into()
        .map_err(|_| Error::CorruptContainer)?;
    *cursor += 4;
    Ok(u32::from_be_bytes(bytes))
}

fn read_array32<'a>(buf: &'a [u8], cursor: &mut usize) -> Result<&'a [u8]> {
    let field = buf.get(*cursor..*cursor + 32).ok_or(Error::CorruptContainer)?;
    *cursor += 32;
    Ok(field)
}

fn push_stream(out: &mut Vec<u8>, stream: &[Ciphertext]) {
    let count: u32 = stream.len().try_into().expect("stream too long");
    out.extend_from_slice(&count.to_be_bytes());
    for c in stream {
        push_len_prefixed_u16(out, &c.to_bytes_be());
    }
}

fn read_stream(buf: &[u8], cursor: &mut usize) -> Result<Vec<Ciphertext>> {
    let count = read_u32(buf, cursor)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let bytes = read_len_prefixed_u16(buf, cursor)?;
        out.push(BigUint::from_bytes_be(bytes));
    }
    Ok(out)
}

fn push_mask(out: &mut Vec<u8>, mask: &Mask) {
    push_len_prefixed_u16(out, &mask.k.to_bytes_be());
    push_len_prefixed_u16(out, &mask.a.to_bytes_be());
    out.extend_from_slice(&mask.seed);
}

fn read_mask(buf: &[u8], cursor: &mut usize, pk: &PublicKey) -> Result<Mask> {
    let k_bytes = read_len_prefixed_u16(buf, cursor)?;
    let k = BigUint::from_bytes_be(k_bytes);
    let a_bytes = read_len_prefixed_u16(buf, cursor)?;
    let a = BigUint::from_bytes_be(a_bytes);
    let seed_bytes = read_array32(buf, cursor)?;
    let mut seed = [0u8; 32];
    seed.copy_from_slice(seed_bytes);

    // Parsers MUST recompute (k, a) from the seed and verify they match
    // the stored values: the seed alone is authoritative, the stored
    // integers exist only for this verification.
    let recomputed = crate::mask::derive_mask(&seed, pk.n());
    if recomputed.k != k || recomputed.a != a {
        return Err(Error::CorruptContainer);
    }

    Ok(Mask { k, a, seed })
}

impl Container {
    /// Serialise every field preceding the tag, then append
    /// `HMAC-SHA256(key = SHA256(salt), message = all preceding bytes)`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.chunk_size.to_be_bytes());
        out.extend_from_slice(&self.stream_count.to_be_bytes());
        push_len_prefixed_u16(&mut out, &self.pk.n().to_bytes_be());
        push_len_prefixed_u16(&mut out, &self.pk.g().to_bytes_be());
        out.extend_from_slice(&self.salt);
        push_stream(&mut out, &self.stream_0);
        push_stream(&mut out, &self.stream_1);
        push_mask(&mut out, &self.mask_0);
        push_mask(&mut out, &self.mask_1);

        let tag = tag_for(&self.salt, &out);
        out.extend_from_slice(&tag);
        out
    }

    /// Parse and fully validate a container: magic, tag, both masks'
    /// seed-recomputation, and equal stream lengths.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < 32 {
            return Err(Error::CorruptContainer);
        }
        let (body, tag) = buf.split_at(buf.len() - 32);

        let mut cursor = 0usize;
        let magic = read_u16(body, &mut cursor)?;
        if magic != MAGIC {
            return Err(Error::CorruptContainer);
        }
        let version = read_u16(body, &mut cursor)?;
        let flags = read_u32(body, &mut cursor)?;
        let chunk_size = read_u16(body, &mut cursor)?;
        let stream_count = read_u32(body, &mut cursor)?;

        let n_bytes = read_len_prefixed_u16(body, &mut cursor)?;
        let n = BigUint::from_bytes_be(n_bytes);
        let g_bytes = read_len_prefixed_u16(body, &mut cursor)?;
        let g = BigUint::from_bytes_be(g_bytes);
        let pk = PublicKey::from_n(n);
        if g != pk.g() {
            return Err(Error::CorruptContainer);
        }

        let salt_bytes = body.get(cursor..cursor + 16).ok_or(Error::CorruptContainer)?;
        let mut salt = [0u8; 16];
        salt.copy_from_slice(salt_bytes);
        cursor += 16;

        let stream_0 = read_stream(body, &mut cursor)?;
        let stream_1 = read_stream(body, &mut cursor)?;
        if stream_0.len() != stream_count as usize || stream_1.len() != stream_count as usize {
            return Err(Error::CorruptContainer);
        }

        let mask_0 = read_mask(body, &mut cursor, &pk)?;
        let mask_1 = read_mask(body, &mut cursor, &pk)?;

        if cursor != body.len() {
            return Err(Error::CorruptContainer);
        }

        let expected_tag = tag_for(&salt, body);
        if !bool::from(expected_tag.ct_eq(tag)) {
            return Err(Error::CorruptContainer);
        }

        Ok(Container {
            version,
            flags,
            pk,
            salt,
            chunk_size,
            stream_count,
            stream_0,
            stream_1,
            mask_0,
            mask_1,
        })
    }
}

fn tag_for(salt: &[u8; 16], body: &[u8]) -> [u8; 32] {
    let key = sha2_hash(salt);
    hmac_sha256(&key, body)
}

fn sha2_hash(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::derive_mask;
    use crate::primegen::generate_keypair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn sample_container() -> Container {
        let mut rng = ChaCha20Rng::from_seed([42u8; 32]);
        let (pk, _sk) = generate_keypair(256, 40, &mut rng, None).unwrap();
        let salt = [6u8; 16];
        let mask_0 = derive_mask(&crate::mask::derive_stream_seed(&salt, b"stream0"), pk.n());
        let mask_1 = derive_mask(&crate::mask::derive_stream_seed(&salt, b"stream1"), pk.n());
        let (c0, _) = pk.encrypt(&BigUint::from(1u32), &mut rng).unwrap();
        let (c1, _) = pk.encrypt(&BigUint::from(2u32), &mut rng).unwrap();
        Container {
            version: VERSION,
            flags: 0,
            chunk_size: 32,
            stream_count: 1,
            stream_0: vec![c0],
            stream_1: vec![c1],
            mask_0,
            mask_1,
            salt,
            pk,
        }
    }

    #[test]
    fn header_matches_documented_magic_and_version_hex() {
        // distilled spec S1/S2 record expected scenario outputs as hex of
        // container bytes; this pins the one prefix that is constant across
        // every container regardless of salt, keys or plaintexts.
        let c = sample_container();
        let bytes = c.to_bytes();
        assert_eq!(hex::encode(&bytes[0..4]), "c0de0001");
    }

    #[test]
    fn round_trips_through_bytes() {
        let c = sample_container();
        let bytes = c.to_bytes();
        let parsed = Container::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.salt, c.salt);
        assert_eq!(parsed.stream_0, c.stream_0);
        assert_eq!(parsed.stream_1, c.stream_1);
        assert_eq!(parsed.mask_0, c.mask_0);
    }

    #[test]
    fn corrupting_tag_byte_is_detected() {
        let c = sample_container();
        let mut bytes = c.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert_eq!(Container::from_bytes(&bytes), Err(Error::CorruptContainer));
    }

    #[test]
    fn corrupting_stream_byte_is_detected() {
        let c = sample_container();
        let mut bytes = c.to_bytes();
        bytes[40] ^= 0x01;
        assert_eq!(Container::from_bytes(&bytes), Err(Error::CorruptContainer));
    }

    #[test]
    fn mismatched_stream_lengths_are_rejected() {
        let mut c = sample_container();
        c.stream_1.push(c.stream_0[0].clone());
        // stream_count still says 1, but stream_1 now has 2 entries —
        // to_bytes would encode the real (mismatched) vector length as
        // the per-stream count prefix, which from_bytes cross-checks
        // against the header's stream_count field.
        let bytes = c.to_bytes();
        assert_eq!(Container::from_bytes(&bytes), Err(Error::CorruptContainer));
    }
}
