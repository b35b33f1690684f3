//! Pipeline rejection conditions, each mapped to one ingress status code.

use ainp_crypto::CryptoError;
use ainp_guard::GuardError;
use thiserror::Error;

/// Routing pipeline errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Signature or identifier failure (`401`).
    #[error(transparent)]
    Signature(#[from] CryptoError),

    /// Anti-abuse rejection; carries its own status mapping.
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// No recipient and no discovery query (`400`).
    #[error("envelope has no recipient and no discovery query")]
    Unroutable,

    /// Unsupported wire version (`400`).
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u16),

    /// The recipient blocked the sender (`403`).
    #[error("recipient has blocked the sender")]
    RecipientBlocked,

    /// Stream broker down after one retry (`503`).
    #[error("stream broker unavailable")]
    UpstreamDown,

    /// Persistence failed after the envelope cleared the pipeline (`500`).
    #[error("delivery failed: {0}")]
    Internal(String),
}
