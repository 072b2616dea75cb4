//! Encrypt flow (two plaintexts -> container) and decrypt flow (container
//! + key -> one plaintext). This is the only layer permitted to touch
//! `tracing` or accept caller-chosen key material in its various forms;
//! the cryptographic core below it (C1-C7) stays free of both.

use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use tracing::debug;

use crate::codec;
use crate::config::{Config, HKDF_INFO_STREAM_0, HKDF_INFO_STREAM_1};
use crate::container::{Container, FLAG_PASSPHRASE_DERIVED, VERSION};
use crate::error::{Error, Result};
use crate::kdf::hkdf_expand_32;
use crate::mask::{self, derive_mask, derive_stream_seed};
use crate::paillier::{PublicKey, SecretKey};
use crate::primegen::derive_keypair_with_rounds;
use crate::router::route;

const KEYGEN_SALT_TAG: &[u8] = b"keygen-salt";

/// How the Paillier keypair for an `encrypt` call should be obtained.
///
/// There is no "generate a fresh keypair and forget it" option: a
/// container is only ever decryptable by someone who goes on to hold the
/// matching `SK`, so the caller must either already have one (`Supplied`,
/// typically from their own call to [`crate::primegen::generate_keypair`])
/// or derive one repeatably later (`Passphrase`).
pub enum KeyMaterial {
    /// Use a caller-supplied keypair as-is. The caller retains their own
    /// copy of `sk` (e.g. to save to a key file) since this call consumes
    /// the one passed in.
    Supplied { pk: PublicKey, sk: SecretKey },
    /// Derive the keypair deterministically from a passphrase, bound to
    /// this container's own (freshly generated) salt.
    Passphrase { passphrase: Vec<u8>, bits: u32 },
}

/// How `decrypt` should obtain the secret key for the routed stream.
pub enum DecryptKeySource {
    /// Recover the secret key by re-deriving it from `key` as a
    /// passphrase; only valid if the container was produced with
    /// [`KeyMaterial::Passphrase`].
    Passphrase,
    /// Use a secret key the caller already holds (loaded from a key
    /// file); only valid if the container was produced with
    /// [`KeyMaterial::Supplied`].
    Supplied(SecretKey),
}

fn keygen_salt(container_salt: &[u8; 16]) -> [u8; 32] {
    hkdf_expand_32(container_salt, KEYGEN_SALT_TAG)
}

/// `(bytes_A, bytes_B, key_material) -> container_bytes`.
pub fn encrypt(
    bytes_a: &[u8],
    bytes_b: &[u8],
    key_material: KeyMaterial,
    config: &Config,
    rng: &mut (impl CryptoRng + RngCore),
) -> Result<Vec<u8>> {
    debug!(len_a = bytes_a.len(), len_b = bytes_b.len(), "encrypt: start");

    let mut salt = [0u8; 16];
    rng.fill_bytes(&mut salt);

    let (pk, sk, flags) = match key_material {
        KeyMaterial::Supplied { pk, sk } => (pk, sk, 0u32),
        KeyMaterial::Passphrase { passphrase, bits } => {
            let salt_for_keygen = keygen_salt(&salt);
            let (pk, sk) = derive_keypair_with_rounds(
                &passphrase,
                &salt_for_keygen,
                bits,
                config.miller_rabin_rounds,
            )?;
            (pk, sk, FLAG_PASSPHRASE_DERIVED)
        }
    };
    // Encryption only ever needs the public key; dropping `sk` here
    // zeroizes it immediately rather than keeping it alive for the rest
    // of this call. The private key is never stored in the container.
    drop(sk);

    let chunk_size = config
        .chunk_size_override
        .unwrap_or_else(|| codec::chunk_size(pk.n()));

    // Each plaintext's own true length must survive the padding below so
    // its length-chunk records *that*, not the shared padded length —
    // otherwise decrypting the shorter plaintext would return its bytes
    // plus the leftover random padding instead of truncating it off.
    let true_len_a = bytes_a.len();
    let true_len_b = bytes_b.len();

    let target_len = true_len_a.max(true_len_b);
    let mut padded_a = bytes_a.to_vec();
    let mut padded_b = bytes_b.to_vec();
    pad_to_length(&mut padded_a, target_len, rng);
    pad_to_length(&mut padded_b, target_len, rng);

    let seed_0 = derive_stream_seed(&salt, HKDF_INFO_STREAM_0);
    let seed_1 = derive_stream_seed(&salt, HKDF_INFO_STREAM_1);
    let mask_0 = derive_mask(&seed_0, pk.n());
    let mask_1 = derive_mask(&seed_1, pk.n());

    let stream_0 = encrypt_stream(&pk, &padded_a, true_len_a, chunk_size, rng)?;
    let stream_1 = encrypt_stream(&pk, &padded_b, true_len_b, chunk_size, rng)?;

    if stream_0.len() != stream_1.len() {
        // Cannot happen given equal-length padding above, but guard the
        // invariant explicitly rather than silently emit a malformed
        // container.
        return Err(Error::InvalidArgument(
            "internal: padded streams produced different chunk counts".into(),
        ));
    }
    let stream_count = stream_0.len() as u32;

    let masked_0 = mask::apply_batch(&pk, &stream_0, &mask_0)?;
    let masked_1 = mask::apply_batch(&pk, &stream_1, &mask_1)?;

    let container = Container {
        version: VERSION,
        flags,
        pk,
        salt,
        chunk_size: chunk_size as u16,
        stream_count,
        stream_0: masked_0,
        stream_1: masked_1,
        mask_0,
        mask_1,
    };

    let bytes = container.to_bytes();
    debug!(bytes = bytes.len(), chunks = stream_count, "encrypt: done");
    Ok(bytes)
}

fn pad_to_length(buf: &mut Vec<u8>, target_len: usize, rng: &mut impl RngCore) {
    if buf.len() >= target_len {
        return;
    }
    let extra = target_len - buf.len();
    let mut padding = vec![0u8; extra];
    rng.fill_bytes(&mut padding);
    buf.extend_from_slice(&padding);
}

/// `bytes` is already padded to the shared, equal-length-across-streams
/// length; `orig_len` is the *true* length of this plaintext before that
/// padding was applied, and is what gets embedded as the stream's
/// length-prefix chunk (`codec::encode`'s own returned length reflects the
/// padded buffer it was handed, not the caller's real plaintext, so it is
/// deliberately discarded here in favour of the caller-supplied value).
fn encrypt_stream(
    pk: &PublicKey,
    bytes: &[u8],
    orig_len: usize,
    chunk_size: usize,
    rng: &mut (impl CryptoRng + RngCore),
) -> Result<Vec<BigUint>> {
    let (data_chunks, _padded_len) = codec::encode(bytes, chunk_size, rng);
    let length_chunk = codec::encode_length_chunk(orig_len);

    let mut out = Vec::with_capacity(data_chunks.len() + 1);
    let (c, _r) = pk.encrypt(&length_chunk, rng)?;
    out.push(c);
    for m in &data_chunks {
        let (c, _r) = pk.encrypt(m, rng)?;
        out.push(c);
    }
    Ok(out)
}

/// `(container_bytes, key) -> plaintext_bytes`.
///
/// The engine never falls back to the unrouted stream: if the routed
/// stream's length-chunk is implausible, or the supplied/derived key
/// doesn't match, this returns `Error::KeyMismatch` rather than trying the
/// other label — doing so would itself leak which label the key reached.
pub fn decrypt(
    container_bytes: &[u8],
    key: &[u8],
    key_source: DecryptKeySource,
    config: &Config,
) -> Result<Vec<u8>> {
    debug!(bytes = container_bytes.len(), "decrypt: start");

    // Container::from_bytes verifies the tag and both masks' seed
    // recomputation before returning, satisfying the "complete tag
    // verification and mask recomputation before branching on the
    // result" timing discipline for any well-formed container.
    let container = Container::from_bytes(container_bytes)?;

    let label = route(key, &container.salt);

    let sk = match key_source {
        DecryptKeySource::Passphrase => {
            let salt_for_keygen = keygen_salt(&container.salt);
            let (derived_pk, derived_sk) = derive_keypair_with_rounds(
                key,
                &salt_for_keygen,
                bits_hint(container.pk.n(), config),
                config.miller_rabin_rounds,
            )?;
            if derived_pk.n() != container.pk.n() {
                return Err(Error::KeyMismatch);
            }
            derived_sk
        }
        DecryptKeySource::Supplied(sk) => sk,
    };

    let (stream, mask) = if label == 0 {
        (&container.stream_0, &container.mask_0)
    } else {
        (&container.stream_1, &container.mask_1)
    };

    let unmasked = mask::remove_batch(&container.pk, stream, mask)?;
    let mut chunks = Vec::with_capacity(unmasked.len());
    for c in &unmasked {
        chunks.push(sk.decrypt(&container.pk, c)?);
    }

    let (length_chunk, data_chunks) = chunks.split_first().ok_or(Error::KeyMismatch)?;
    let orig_len = codec::decode_length_chunk(length_chunk, container.chunk_size as usize)
        .map_err(|_| Error::KeyMismatch)?;

    let plaintext = codec::decode(data_chunks, orig_len, container.chunk_size as usize)
        .map_err(|_| Error::KeyMismatch)?;

    debug!(len = plaintext.len(), "decrypt: done");
    Ok(plaintext)
}

/// Recover the `bits` parameter `derive_keypair` needs from the stored
/// modulus, preferring the caller's declared `Config` (the wire format
/// deliberately does not store the original bit-length parameter) and
/// falling back to the nearest even bit length of `n` itself.
fn bits_hint(n: &BigUint, config: &Config) -> u32 {
    if config.key_bits > 0 {
        config.key_bits
    } else {
        let bits = n.bits() as u32;
        bits + (bits % 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primegen::generate_keypair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn cfg() -> Config {
        Config::default().with_key_bits(256).with_miller_rabin_rounds(40)
    }

    fn supplied_keypair(seed: u8) -> (PublicKey, SecretKey) {
        let mut rng = ChaCha20Rng::from_seed([seed; 32]);
        generate_keypair(256, 40, &mut rng, None).unwrap()
    }

    fn sk_clone(sk: &SecretKey) -> SecretKey {
        SecretKey::from_lambda_mu(sk.n().clone(), sk.lambda().clone(), sk.mu().clone())
    }

    // With a supplied keypair, the decrypt-time "key" argument only drives
    // routing; it is unrelated to the secret key, so two arbitrary distinct
    // keys that route to different labels both successfully decrypt, each
    // to a different one of the two plaintexts. Passphrase-mode decryption
    // instead requires the exact original passphrase (it both routes and
    // re-derives the matching keypair), so it cannot demonstrate this
    // two-recipient property directly.
    #[test]
    fn container_round_trip_both_labels() {
        let mut rng = ChaCha20Rng::from_seed([50u8; 32]);
        let (pk, sk) = supplied_keypair(90);
        let bytes = encrypt(
            b"hello",
            b"world",
            KeyMaterial::Supplied { pk, sk: sk_clone(&sk) },
            &cfg(),
            &mut rng,
        )
        .unwrap();

        let parsed = Container::from_bytes(&bytes).unwrap();
        let mut key0 = None;
        let mut key1 = None;
        for i in 0u32..2000 {
            let candidate = i.to_be_bytes();
            match route(&candidate, &parsed.salt) {
                0 if key0.is_none() => key0 = Some(candidate),
                1 if key1.is_none() => key1 = Some(candidate),
                _ => {}
            }
            if key0.is_some() && key1.is_some() {
                break;
            }
        }
        let (key0, key1) = (key0.unwrap(), key1.unwrap());

        let out0 = decrypt(&bytes, &key0, DecryptKeySource::Supplied(sk_clone(&sk)), &cfg()).unwrap();
        let out1 = decrypt(&bytes, &key1, DecryptKeySource::Supplied(sk_clone(&sk)), &cfg()).unwrap();

        assert_ne!(out0, out1);
        assert!(out0 == b"hello" || out0 == b"world");
        assert!(out1 == b"hello" || out1 == b"world");
    }

    #[test]
    fn length_padding_does_not_leak() {
        // Scenario S3: A and B have different lengths (5 vs 11 bytes), so
        // the shorter one is padded before encryption. This must decrypt
        // back to exactly its own original bytes — not those bytes plus
        // leftover random padding — for *both* labels, not just whichever
        // one this RNG seed happens to route to first.
        let mut rng = ChaCha20Rng::from_seed([51u8; 32]);
        let (pk, sk) = supplied_keypair(91);
        let bytes = encrypt(
            b"alpha",
            b"beta-longer",
            KeyMaterial::Supplied { pk, sk: sk_clone(&sk) },
            &cfg(),
            &mut rng,
        )
        .unwrap();

        let parsed = Container::from_bytes(&bytes).unwrap();
        let mut seen_a = false;
        let mut seen_b = false;
        for i in 0u32..2000 {
            let candidate = i.to_be_bytes();
            let label = route(&candidate, &parsed.salt);
            let out = decrypt(&bytes, &candidate, DecryptKeySource::Supplied(sk_clone(&sk)), &cfg())
                .unwrap();
            if label == 0 {
                assert_eq!(out, b"alpha");
                seen_a = true;
            } else {
                assert_eq!(out, b"beta-longer");
                seen_b = true;
            }
            if seen_a && seen_b {
                break;
            }
        }
        assert!(seen_a && seen_b);
    }

    #[test]
    fn corrupt_tag_is_rejected() {
        let mut rng = ChaCha20Rng::from_seed([52u8; 32]);
        let mut bytes = encrypt(
            b"hello",
            b"world",
            KeyMaterial::Passphrase {
                passphrase: b"p0".to_vec(),
                bits: 256,
            },
            &cfg(),
            &mut rng,
        )
        .unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 1;
        assert_eq!(
            decrypt(&bytes, b"whatever", DecryptKeySource::Passphrase, &cfg()),
            Err(Error::CorruptContainer)
        );
    }

    use tracing_test::traced_test; // enable logs in tests

    #[test]
    #[traced_test]
    fn encrypt_decrypt_emit_orchestrator_debug_logs() {
        // Mirrors the teacher's own `#[traced_test]` convention: run a flow
        // with logging enabled so a developer can `cargo test -- --nocapture`
        // and see the `encrypt`/`decrypt` boundary logs (byte lengths and
        // chunk counts only — see the module doc comment on what never gets
        // logged).
        let mut rng = ChaCha20Rng::from_seed([57u8; 32]);
        let bytes = encrypt(
            b"hello",
            b"world",
            KeyMaterial::Passphrase { passphrase: b"p0".to_vec(), bits: 256 },
            &cfg(),
            &mut rng,
        )
        .unwrap();
        let out = decrypt(&bytes, b"p0", DecryptKeySource::Passphrase, &cfg()).unwrap();
        assert!(out == b"hello" || out == b"world");
    }

    #[test]
    fn passphrase_decrypt_recovers_exactly_one_plaintext() {
        let mut rng = ChaCha20Rng::from_seed([55u8; 32]);
        let bytes = encrypt(
            b"hello",
            b"world",
            KeyMaterial::Passphrase { passphrase: b"p0".to_vec(), bits: 256 },
            &cfg(),
            &mut rng,
        )
        .unwrap();
        let out = decrypt(&bytes, b"p0", DecryptKeySource::Passphrase, &cfg()).unwrap();
        assert!(out == b"hello" || out == b"world");
    }

    #[test]
    fn wrong_passphrase_is_key_mismatch_not_silent_fallback() {
        let mut rng = ChaCha20Rng::from_seed([56u8; 32]);
        let bytes = encrypt(
            b"hello",
            b"world",
            KeyMaterial::Passphrase { passphrase: b"p0".to_vec(), bits: 256 },
            &cfg(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(
            decrypt(&bytes, b"not-the-passphrase", DecryptKeySource::Passphrase, &cfg()),
            Err(Error::KeyMismatch)
        );
    }

    #[test]
    fn distinct_passphrases_produce_distinct_containers() {
        let mut rng = ChaCha20Rng::from_seed([53u8; 32]);
        let x = encrypt(
            b"hello",
            b"world",
            KeyMaterial::Passphrase { passphrase: b"p0".to_vec(), bits: 256 },
            &cfg(),
            &mut rng,
        )
        .unwrap();
        let mut rng2 = ChaCha20Rng::from_seed([53u8; 32]);
        let y = encrypt(
            b"hello",
            b"world",
            KeyMaterial::Passphrase { passphrase: b"p1".to_vec(), bits: 256 },
            &cfg(),
            &mut rng2,
        )
        .unwrap();
        assert_ne!(x, y);
    }

    #[test]
    fn large_payload_round_trips_byte_exact() {
        let mut rng = ChaCha20Rng::from_seed([54u8; 32]);
        let a: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let b: Vec<u8> = (0..20_000u32).map(|i| ((i * 7) % 251) as u8).collect();
        let (pk, sk) = supplied_keypair(92);
        let bytes = encrypt(
            &a,
            &b,
            KeyMaterial::Supplied { pk, sk: sk_clone(&sk) },
            &cfg(),
            &mut rng,
        )
        .unwrap();
        let parsed = Container::from_bytes(&bytes).unwrap();
        let mut key0 = None;
        for i in 0u32..5000 {
            let candidate = i.to_be_bytes();
            if route(&candidate, &parsed.salt) == 0 {
                key0 = Some(candidate);
                break;
            }
        }
        let key0 = key0.unwrap();
        let out = decrypt(&bytes, &key0, DecryptKeySource::Supplied(sk), &cfg()).unwrap();
        assert_eq!(out, a);
    }
}
