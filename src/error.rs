//! Crate-wide error type.
//!
//! No variant here carries plaintext-, key-, or label-derived content: error
//! messages must not let a caller infer which stream of a container was
//! routed to, only that *something* about the request was invalid.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An input fell outside its documented range (e.g. `m >= n`, a
    /// requested bit length too small to be useful).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A modular inverse was requested for operands that are not coprime.
    #[error("modular inverse does not exist: operands are not coprime")]
    NotCoprime,

    /// A ciphertext was outside `[1, n^2)` or not coprime with `n`.
    #[error("ciphertext is not a valid element of Z_n^2*")]
    InvalidCiphertext,

    /// Container parsing, tag verification, or mask-seed recomputation
    /// failed.
    #[error("container is corrupt or has been tampered with")]
    CorruptContainer,

    /// The supplied key routed to a stream whose decrypted length-chunk was
    /// not plausible: the key does not match this container.
    #[error("key does not match this container")]
    KeyMismatch,

    /// The underlying RNG failed to produce the requested bytes.
    #[error("random number generator failed")]
    RngFailure,

    /// A prime-generation loop was cancelled via its cancellation hook.
    #[error("operation was cancelled")]
    Cancelled,

    /// Ambient I/O failure, surfaced only at the CLI boundary.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
