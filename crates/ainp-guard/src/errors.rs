//! Guard rejection conditions. Every variant maps to exactly one ingress
//! status code.

use thiserror::Error;

/// Anti-abuse rejections.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// Envelope id seen within the replay window (`409`).
    #[error("duplicate envelope: {envelope_id}")]
    Duplicate { envelope_id: String },

    /// Identical body delivered within the dedupe window (`409`).
    #[error("duplicate content: {body_hash}")]
    DuplicateContent { body_hash: String },

    /// Deadline passed or timestamp beyond the accepted skew (`400`).
    #[error("envelope expired or future-dated (timestamp {timestamp}, now {now})")]
    ExpiredOrFuture { timestamp: u64, now: u64 },

    /// First-contact greylist delay still running (`425` + `Retry-After`).
    #[error("greylisted, retry after {retry_after_secs}s")]
    TooEarly { retry_after_secs: u64 },

    /// Postage debit failed for lack of funds (`402` + payment challenge).
    #[error("postage required: {required} atomic, available {available}")]
    PaymentRequired { required: u64, available: u64 },

    /// Sliding window exhausted (`429` + `Retry-After`).
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}
