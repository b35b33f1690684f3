//! Discovery domain entities: agent rows, capabilities, trust vectors, and
//! the cached usefulness score.

use ainp_types::{CapabilitySpec, Did};
use serde::{Deserialize, Serialize};

/// A registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub did: Did,
    /// Raw Ed25519 public key recovered from the identifier, when the DID
    /// is key-embedded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<Vec<u8>>,
    pub created_at: u64,
    pub last_seen_at: u64,
    /// Soft expiry; expired agents are filtered from discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl AgentRecord {
    /// Whether the registration TTL has elapsed.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_ms)
    }
}

/// A stored capability with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub description: String,
    /// Fixed-dimension embedding of the description.
    pub embedding: Vec<f32>,
    pub tags: Vec<String>,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl Capability {
    /// Build from the wire spec plus a computed embedding.
    #[must_use]
    pub fn from_spec(spec: &CapabilitySpec, embedding: Vec<f32>) -> Self {
        Self {
            description: spec.description.clone(),
            embedding,
            tags: spec.tags.clone(),
            version: spec.version.clone(),
            evidence_ref: spec.evidence_ref.clone(),
            latency_ms: spec.latency_ms,
            cost: spec.cost,
        }
    }

    /// Whether this capability's tag set covers every queried tag.
    #[must_use]
    pub fn covers_tags(&self, queried: &[String]) -> bool {
        queried.iter().all(|t| self.tags.contains(t))
    }
}

/// Per-agent trust with its dimensions, all in [0,1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustVector {
    pub reliability: f64,
    pub honesty: f64,
    pub competence: f64,
    pub timeliness: f64,
    /// Fraction decayed per day of inactivity.
    pub decay_rate: f64,
    pub updated_at: u64,
}

impl TrustVector {
    /// Neutral starting trust.
    pub const DEFAULT_SEED: f64 = 0.5;

    /// Default daily decay.
    pub const DEFAULT_DECAY_RATE: f64 = 0.01;

    /// Start all dimensions at a seed value.
    #[must_use]
    pub fn seeded(seed: f64, now_ms: u64) -> Self {
        let seed = seed.clamp(0.0, 1.0);
        Self {
            reliability: seed,
            honesty: seed,
            competence: seed,
            timeliness: seed,
            decay_rate: Self::DEFAULT_DECAY_RATE,
            updated_at: now_ms,
        }
    }

    /// Aggregate score: equal-weighted mean of the dimensions.
    #[must_use]
    pub fn aggregate(&self) -> f64 {
        (self.reliability + self.honesty + self.competence + self.timeliness) / 4.0
    }

    /// Nudge a dimension toward an observation, clamped to [0,1].
    pub fn observe(&mut self, dimension: TrustDimension, observation: f64, alpha: f64, now_ms: u64) {
        let slot = match dimension {
            TrustDimension::Reliability => &mut self.reliability,
            TrustDimension::Honesty => &mut self.honesty,
            TrustDimension::Competence => &mut self.competence,
            TrustDimension::Timeliness => &mut self.timeliness,
        };
        *slot = ((1.0 - alpha) * *slot + alpha * observation).clamp(0.0, 1.0);
        self.updated_at = now_ms;
    }

    /// Apply time decay toward the neutral seed.
    pub fn decay(&mut self, elapsed_days: f64, now_ms: u64) {
        let factor = (1.0 - self.decay_rate).powf(elapsed_days.max(0.0));
        for slot in [
            &mut self.reliability,
            &mut self.honesty,
            &mut self.competence,
            &mut self.timeliness,
        ] {
            *slot = Self::DEFAULT_SEED + (*slot - Self::DEFAULT_SEED) * factor;
        }
        self.updated_at = now_ms;
    }
}

/// Trust dimensions updated after settled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDimension {
    Reliability,
    Honesty,
    Competence,
    Timeliness,
}

/// Cached 30-day rolling usefulness, written by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsefulnessEntry {
    /// Rolling score in [0,100].
    pub score: f64,
    pub updated_at: u64,
}
