//! Cryptographic failure modes surfaced by envelope verification.

use thiserror::Error;

/// Errors from canonicalization, key recovery, and verification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The identifier tail is not valid multibase base58btc.
    #[error("malformed DID: {0}")]
    MalformedDid(String),

    /// The DID method or key type is not supported for verification.
    #[error("unsupported DID: {0}")]
    UnsupportedDid(String),

    /// Decoded key bytes are not a valid Ed25519 point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// The envelope carries no signature.
    #[error("signature missing")]
    SignatureMissing,

    /// Signature bytes are malformed or do not verify.
    #[error("bad signature")]
    BadSignature,
}
