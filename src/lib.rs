//! A key-indistinguishable dual-plaintext cipher: a single container
//! decrypts, under two distinct keys, to two distinct plaintexts, such
//! that examining the container plus this crate's full source does not
//! reveal which recovered plaintext was the caller's "intended" one.
//!
//! Built from a Paillier-style additively-homomorphic scheme
//! ([`paillier`]), a homomorphic linear mask ([`mask`]), a chunked
//! byte/integer codec ([`codec`]), a constant-time key-routing predicate
//! ([`router`]), and a self-describing container format ([`container`]).
//! [`orchestrator`] ties these into the public `encrypt`/`decrypt` flows.

pub mod bigint;
pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod kdf;
pub mod mask;
pub mod orchestrator;
pub mod paillier;
pub mod primegen;
pub mod router;

pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::{decrypt, encrypt, DecryptKeySource, KeyMaterial};
pub use paillier::{PublicKey, SecretKey};
