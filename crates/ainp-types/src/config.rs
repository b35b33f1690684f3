//! # Broker Configuration
//!
//! All recognized runtime options with their defaults. The composition root
//! loads overrides from the environment; subsystems receive the validated
//! struct and never read the environment themselves.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance when checking that ranking weights sum to 1.
const WEIGHT_EPSILON: f64 = 1e-6;

/// Configuration validation failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("discovery weights sum to {sum}, expected 1.0")]
    WeightsDoNotSum { sum: f64 },

    #[error("quorum k={k} exceeds committee size m={m}")]
    QuorumExceedsCommittee { k: usize, m: usize },

    #[error("negotiation max_rounds={0} outside [1,20]")]
    MaxRoundsOutOfRange(u32),

    #[error("{field} must be positive")]
    NonPositive { field: &'static str },
}

/// Signature pipeline options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureConfig {
    /// Gate for envelope signature verification.
    pub enabled: bool,
    /// Accept the literal test sentinel in place of a signature. Only
    /// honored when `enabled` is false (designated test profile).
    pub allow_test_sentinel: bool,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_test_sentinel: false,
        }
    }
}

/// Credit ledger options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditConfig {
    pub enabled: bool,
    /// Deposit granted on first registration, in atomic units.
    pub initial_allocation: u64,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_allocation: 1_000_000,
        }
    }
}

/// Negotiation engine options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    pub max_rounds: u32,
    pub ttl_ms: u64,
    pub convergence_threshold: f64,
    /// Cadence of the background expiry sweeper, in seconds.
    pub expiration_interval_secs: u64,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            ttl_ms: 300_000,
            convergence_threshold: 0.9,
            expiration_interval_secs: 60,
        }
    }
}

/// Per-DID sliding-window rate limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_requests: 120,
        }
    }
}

/// Semantic discovery ranking and caching options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub similarity_weight: f64,
    pub trust_weight: f64,
    pub usefulness_weight: f64,
    /// Feature gate for the usefulness-aware blend. When off, ranking uses
    /// the classic `0.6 * similarity + 0.4 * trust` split.
    pub usefulness_ranking_enabled: bool,
    pub similarity_threshold: f64,
    pub search_limit: usize,
    pub query_cache_ttl_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            similarity_weight: 0.6,
            trust_weight: 0.3,
            usefulness_weight: 0.1,
            usefulness_ranking_enabled: false,
            similarity_threshold: 0.7,
            search_limit: 10,
            query_cache_ttl_secs: 300,
        }
    }
}

/// Proof-of-usefulness pipeline options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PouConfig {
    /// Attestation quorum (k).
    pub quorum_k: usize,
    /// Committee size (m).
    pub committee_m: usize,
    /// Finalizer cadence, in seconds.
    pub finalizer_interval_secs: u64,
    /// Restrict committees to staked agents.
    pub require_stake: bool,
    /// Reputation EWMA smoothing factor.
    pub reputation_alpha: f64,
    /// Usefulness aggregator cadence, in hours.
    pub aggregation_interval_hours: u64,
}

impl Default for PouConfig {
    fn default() -> Self {
        Self {
            quorum_k: 3,
            committee_m: 5,
            finalizer_interval_secs: 60,
            require_stake: false,
            reputation_alpha: 0.2,
            aggregation_interval_hours: 1,
        }
    }
}

/// Mail anti-abuse policy toggles (email facet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailPolicyConfig {
    pub greylist_enabled: bool,
    pub postage_enabled: bool,
    pub content_dedupe_enabled: bool,
    /// Postage debit for cold outbound, atomic units.
    pub postage_amount_atomic: u64,
    pub greylist_delay_secs: u64,
    pub dedupe_ttl_secs: u64,
}

impl Default for MailPolicyConfig {
    fn default() -> Self {
        Self {
            greylist_enabled: false,
            postage_enabled: false,
            content_dedupe_enabled: true,
            postage_amount_atomic: 100,
            greylist_delay_secs: 60,
            dedupe_ttl_secs: 600,
        }
    }
}

/// Top-level broker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub signature: SignatureConfig,
    pub credits: CreditConfig,
    pub negotiation: NegotiationConfig,
    pub rate_limit: RateLimitConfig,
    pub discovery: DiscoveryConfig,
    pub pou: PouConfig,
    pub mail_policy: MailPolicyConfig,
    /// Accepted clock skew for sender timestamps, milliseconds.
    pub clock_skew_ms: u64,
}

impl BrokerConfig {
    /// Default clock skew (60 s).
    pub const DEFAULT_CLOCK_SKEW_MS: u64 = 60_000;

    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.discovery.similarity_weight
            + self.discovery.trust_weight
            + self.discovery.usefulness_weight;
        if (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(ConfigError::WeightsDoNotSum { sum });
        }
        if self.pou.quorum_k > self.pou.committee_m {
            return Err(ConfigError::QuorumExceedsCommittee {
                k: self.pou.quorum_k,
                m: self.pou.committee_m,
            });
        }
        if self.negotiation.max_rounds == 0 || self.negotiation.max_rounds > 20 {
            return Err(ConfigError::MaxRoundsOutOfRange(self.negotiation.max_rounds));
        }
        if self.rate_limit.window_ms == 0 {
            return Err(ConfigError::NonPositive {
                field: "rate_limit.window_ms",
            });
        }
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::NonPositive {
                field: "rate_limit.max_requests",
            });
        }
        Ok(())
    }

    /// Effective clock skew, falling back to the default when unset.
    #[must_use]
    pub fn clock_skew_ms(&self) -> u64 {
        if self.clock_skew_ms == 0 {
            Self::DEFAULT_CLOCK_SKEW_MS
        } else {
            self.clock_skew_ms
        }
    }
}
