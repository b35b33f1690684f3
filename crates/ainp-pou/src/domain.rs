//! Proof-of-usefulness domain entities.

use ainp_types::Did;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Receipt lifecycle; monotone toward a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Pending,
    Finalized,
    Disputed,
    Failed,
}

impl ReceiptStatus {
    /// Whether the status can still change.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, ReceiptStatus::Pending)
    }
}

/// Attestation kinds accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttestationType {
    /// Client acknowledgment of delivered work.
    Accepted,
    /// Committee audit of the outputs.
    AuditPass,
    /// Committee safety review.
    SafetyPass,
    /// Committee objection; enough of these dispute the receipt.
    Reject,
}

/// One attestation row, unique on (task, attestor, type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub id: Uuid,
    pub task_id: Uuid,
    pub attestor: Did,
    pub attestation_type: AttestationType,
    /// Quality score in [0,1].
    pub score: f64,
    /// Attestor confidence in [0,1].
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub created_at: u64,
}

/// A task receipt awaiting committee finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReceipt {
    pub id: Uuid,
    pub intent_id: String,
    /// The agent that performed the work.
    pub provider: Did,
    /// The agent that paid for it.
    pub client: Did,
    pub intent_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs_ref: Option<String>,
    #[serde(default)]
    pub metrics: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_ref: Option<String>,
    pub amount_atomic: u64,
    pub status: ReceiptStatus,
    /// Ordered committee; length may be under `committee_m` when fewer
    /// agents were eligible.
    pub committee: Vec<Did>,
    /// Effective quorum (already scaled for a short committee).
    pub quorum_k: usize,
    /// Configured committee size at creation.
    pub committee_m: usize,
    /// Seed of the deterministic committee shuffle, hex.
    pub selection_seed: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl TaskReceipt {
    /// Whether the agent sits on the committee.
    #[must_use]
    pub fn is_committee_member(&self, agent: &Did) -> bool {
        self.committee.contains(agent)
    }
}

/// Work categories recognized by usefulness scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    Compute,
    Memory,
    Routing,
    Validation,
    Learning,
}

/// An attested record of productive work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsefulnessProof {
    pub id: Uuid,
    pub agent: Did,
    pub work_type: WorkType,
    /// Non-negative metric values keyed by metric name.
    pub metrics: HashMap<String, f64>,
    /// Attestation references backing the proof.
    #[serde(default)]
    pub attestations: Vec<String>,
    pub trace_id: String,
    /// Claimed completion time, Unix milliseconds.
    pub timestamp: u64,
}

/// Seven-dimension reputation vector, all dimensions in [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReputationVector {
    /// Quality: mean attestation score.
    pub quality: f64,
    /// Timeliness: delivery latency against the proposal.
    pub timeliness: f64,
    /// Reliability: finalized vs disputed outcomes.
    pub reliability: f64,
    /// Safety: fraction of safety passes.
    pub safety: f64,
    /// Validation: participation as a consistent attestor.
    pub validation: f64,
    /// Integrity: absence of committee objections.
    pub integrity: f64,
    /// Efficiency: cost against the proposal.
    pub efficiency: f64,
    pub updated_at: u64,
}

impl ReputationVector {
    /// Neutral starting point for a first receipt.
    #[must_use]
    pub fn neutral(now_ms: u64) -> Self {
        Self {
            quality: 0.5,
            timeliness: 0.5,
            reliability: 0.5,
            safety: 0.5,
            validation: 0.5,
            integrity: 0.5,
            efficiency: 0.5,
            updated_at: now_ms,
        }
    }

    /// EWMA step toward an observation, clamped to [0,1].
    pub fn observe(slot: &mut f64, observation: f64, alpha: f64) {
        *slot = ((1.0 - alpha) * *slot + alpha * observation).clamp(0.0, 1.0);
    }
}

/// Pipeline errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PouError {
    #[error("receipt not found: {0}")]
    ReceiptNotFound(Uuid),

    /// The attestor is neither the client (for ACCEPTED) nor a committee
    /// member (for the audit types).
    #[error("unauthorized attestation by {attestor} of type {attestation_type:?}")]
    UnauthorizedAttestation {
        attestor: Did,
        attestation_type: AttestationType,
    },

    /// Same (task, attestor, type) already recorded.
    #[error("duplicate attestation")]
    DuplicateAttestation,

    /// Receipt already reached a terminal status.
    #[error("receipt {id} is {status:?}")]
    ReceiptClosed { id: Uuid, status: ReceiptStatus },

    /// Score or confidence outside [0,1].
    #[error("{field} {value} outside [0,1]")]
    OutOfRange { field: &'static str, value: f64 },

    /// Proof failed validation.
    #[error("invalid proof: {0}")]
    InvalidProof(&'static str),
}
