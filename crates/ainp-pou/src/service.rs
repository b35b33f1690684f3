//! # Receipt Service
//!
//! Receipt creation on settlement, attestation acceptance, quorum
//! evaluation, and the reputation write-back that finalization triggers.

use crate::committee::{scaled_quorum, select_committee};
use crate::domain::{
    Attestation, AttestationType, PouError, ReceiptStatus, ReputationVector, TaskReceipt,
};
use crate::ports::{CommitteeRoster, NullReceiptNotifier, ReceiptNotifier};
use ainp_crypto::selection_seed;
use ainp_types::config::PouConfig;
use ainp_types::{Clock, Did};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything needed to open a receipt at settlement time.
#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub intent_id: String,
    pub provider: Did,
    pub client: Did,
    pub intent_type: String,
    pub amount_atomic: u64,
    pub payment_ref: Option<String>,
    pub metrics: serde_json::Value,
}

/// The receipt and attestation engine.
pub struct ReceiptService {
    clock: Arc<dyn Clock>,
    config: PouConfig,
    roster: Arc<dyn CommitteeRoster>,
    notifier: Arc<dyn ReceiptNotifier>,
    receipts: DashMap<Uuid, Arc<Mutex<TaskReceipt>>>,
    attestations: DashMap<Uuid, Vec<Attestation>>,
    reputations: DashMap<Did, ReputationVector>,
}

impl ReceiptService {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, config: PouConfig, roster: Arc<dyn CommitteeRoster>) -> Self {
        Self {
            clock,
            config,
            roster,
            notifier: Arc::new(NullReceiptNotifier),
            receipts: DashMap::new(),
            attestations: DashMap::new(),
            reputations: DashMap::new(),
        }
    }

    /// Attach a transition notifier (builder style, before sharing).
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn ReceiptNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Open a pending receipt with a freshly selected committee.
    pub fn create_receipt(&self, new: NewReceipt) -> TaskReceipt {
        let now = self.clock.now_ms();
        let seed = selection_seed();
        let ranked = self.roster.candidates(&[&new.provider, &new.client]);
        let committee = select_committee(&seed, &ranked, self.config.committee_m);
        let quorum_k = scaled_quorum(
            self.config.quorum_k,
            self.config.committee_m,
            committee.len(),
        );
        let receipt = TaskReceipt {
            id: Uuid::new_v4(),
            intent_id: new.intent_id,
            provider: new.provider,
            client: new.client,
            intent_type: new.intent_type,
            inputs_ref: None,
            outputs_ref: None,
            metrics: new.metrics,
            payment_ref: new.payment_ref,
            amount_atomic: new.amount_atomic,
            status: ReceiptStatus::Pending,
            committee,
            quorum_k,
            committee_m: self.config.committee_m,
            selection_seed: hex::encode(seed),
            finalized_at: None,
            created_at: now,
            updated_at: now,
        };
        info!(
            receipt = %receipt.id,
            provider = %receipt.provider,
            committee = receipt.committee.len(),
            quorum = receipt.quorum_k,
            "Task receipt created"
        );
        self.receipts
            .insert(receipt.id, Arc::new(Mutex::new(receipt.clone())));
        receipt
    }

    /// Receipt snapshot.
    pub fn receipt(&self, id: Uuid) -> Result<TaskReceipt, PouError> {
        Ok(self.handle(id)?.lock().clone())
    }

    /// Ordered committee of a receipt.
    pub fn committee(&self, id: Uuid) -> Result<Vec<Did>, PouError> {
        Ok(self.handle(id)?.lock().committee.clone())
    }

    /// Attestations recorded for a task.
    #[must_use]
    pub fn attestations(&self, task_id: Uuid) -> Vec<Attestation> {
        self.attestations
            .get(&task_id)
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    /// Accept an attestation.
    ///
    /// Only the task client may submit `ACCEPTED`; only committee members
    /// may submit the audit types. Duplicate `(task, attestor, type)` is
    /// rejected.
    #[allow(clippy::too_many_arguments)]
    pub fn attest(
        &self,
        task_id: Uuid,
        attestor: &Did,
        attestation_type: AttestationType,
        score: f64,
        confidence: f64,
        evidence_ref: Option<String>,
        signature: Option<String>,
    ) -> Result<Attestation, PouError> {
        if !(0.0..=1.0).contains(&score) {
            return Err(PouError::OutOfRange {
                field: "score",
                value: score,
            });
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(PouError::OutOfRange {
                field: "confidence",
                value: confidence,
            });
        }

        let handle = self.handle(task_id)?;
        let receipt = handle.lock();
        if !receipt.status.is_open() {
            return Err(PouError::ReceiptClosed {
                id: task_id,
                status: receipt.status,
            });
        }
        let authorized = match attestation_type {
            AttestationType::Accepted => &receipt.client == attestor,
            AttestationType::AuditPass
            | AttestationType::SafetyPass
            | AttestationType::Reject => receipt.is_committee_member(attestor),
        };
        if !authorized {
            return Err(PouError::UnauthorizedAttestation {
                attestor: attestor.clone(),
                attestation_type,
            });
        }
        drop(receipt);

        let attestation = Attestation {
            id: Uuid::new_v4(),
            task_id,
            attestor: attestor.clone(),
            attestation_type,
            score,
            confidence,
            evidence_ref,
            signature,
            created_at: self.clock.now_ms(),
        };

        let mut rows = self.attestations.entry(task_id).or_default();
        let duplicate = rows
            .iter()
            .any(|a| &a.attestor == attestor && a.attestation_type == attestation_type);
        if duplicate {
            return Err(PouError::DuplicateAttestation);
        }
        rows.push(attestation.clone());
        debug!(task = %task_id, attestor = %attestor, kind = ?attestation_type, "Attestation recorded");
        Ok(attestation)
    }

    /// Evaluate a pending receipt against its quorum. Returns the new
    /// status when the receipt transitioned.
    pub fn evaluate(&self, task_id: Uuid) -> Result<Option<ReceiptStatus>, PouError> {
        let handle = self.handle(task_id)?;
        let mut receipt = handle.lock();
        if !receipt.status.is_open() {
            return Ok(None);
        }
        let attestations = self.attestations(task_id);

        let distinct_of = |kind: AttestationType| -> usize {
            attestations
                .iter()
                .filter(|a| a.attestation_type == kind && receipt.is_committee_member(&a.attestor))
                .map(|a| a.attestor.clone())
                .collect::<HashSet<_>>()
                .len()
        };

        let audit_passes = distinct_of(AttestationType::AuditPass);
        let rejects = distinct_of(AttestationType::Reject);
        let now = self.clock.now_ms();

        if receipt.quorum_k > 0 && audit_passes >= receipt.quorum_k {
            receipt.status = ReceiptStatus::Finalized;
            receipt.finalized_at = Some(now);
            receipt.updated_at = now;
            let snapshot = receipt.clone();
            drop(receipt);
            info!(receipt = %task_id, audit_passes, "Receipt finalized");
            self.apply_reputation(&snapshot, &attestations, true);
            self.notifier.receipt_transitioned(&snapshot);
            return Ok(Some(ReceiptStatus::Finalized));
        }
        if receipt.quorum_k > 0 && rejects >= receipt.quorum_k {
            receipt.status = ReceiptStatus::Disputed;
            receipt.updated_at = now;
            let snapshot = receipt.clone();
            drop(receipt);
            warn!(receipt = %task_id, rejects, "Receipt disputed");
            self.apply_reputation(&snapshot, &attestations, false);
            self.notifier.receipt_transitioned(&snapshot);
            return Ok(Some(ReceiptStatus::Disputed));
        }
        Ok(None)
    }

    /// Synchronous manual finalization: evaluate and return the receipt.
    pub fn finalize(&self, task_id: Uuid) -> Result<TaskReceipt, PouError> {
        self.evaluate(task_id)?;
        self.receipt(task_id)
    }

    /// Ids of receipts still awaiting quorum.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.receipts
            .iter()
            .filter(|entry| entry.value().lock().status.is_open())
            .map(|entry| *entry.key())
            .collect()
    }

    /// One finalizer pass over every pending receipt. Per-receipt errors
    /// log and continue.
    pub fn finalize_due(&self) -> usize {
        let mut transitioned = 0;
        for id in self.pending_ids() {
            match self.evaluate(id) {
                Ok(Some(_)) => transitioned += 1,
                Ok(None) => {}
                Err(err) => warn!(receipt = %id, error = %err, "Finalizer pass failed"),
            }
        }
        transitioned
    }

    /// Current reputation, when any receipt has finalized for the agent.
    #[must_use]
    pub fn reputation(&self, did: &Did) -> Option<ReputationVector> {
        self.reputations.get(did).map(|r| *r)
    }

    fn handle(&self, id: Uuid) -> Result<Arc<Mutex<TaskReceipt>>, PouError> {
        self.receipts
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(PouError::ReceiptNotFound(id))
    }

    /// Reputation write-back after a terminal transition.
    fn apply_reputation(
        &self,
        receipt: &TaskReceipt,
        attestations: &[Attestation],
        finalized: bool,
    ) {
        let now = self.clock.now_ms();
        let alpha = self.config.reputation_alpha;
        let committee_len = receipt.committee.len().max(1) as f64;

        let positive_scores: Vec<f64> = attestations
            .iter()
            .filter(|a| {
                matches!(
                    a.attestation_type,
                    AttestationType::Accepted
                        | AttestationType::AuditPass
                        | AttestationType::SafetyPass
                )
            })
            .map(|a| a.score)
            .collect();
        let distinct = |kind: AttestationType| -> f64 {
            attestations
                .iter()
                .filter(|a| a.attestation_type == kind && receipt.is_committee_member(&a.attestor))
                .map(|a| a.attestor.clone())
                .collect::<HashSet<_>>()
                .len() as f64
        };

        let mut provider = *self
            .reputations
            .entry(receipt.provider.clone())
            .or_insert_with(|| ReputationVector::neutral(now));

        if !positive_scores.is_empty() {
            let quality = positive_scores.iter().sum::<f64>() / positive_scores.len() as f64;
            ReputationVector::observe(&mut provider.quality, quality, alpha);
        }
        if let Some(timeliness) = ratio_observation(&receipt.metrics, "proposed_latency_ms", "latency_ms")
        {
            ReputationVector::observe(&mut provider.timeliness, timeliness, alpha);
        }
        ReputationVector::observe(
            &mut provider.reliability,
            if finalized { 1.0 } else { 0.0 },
            alpha,
        );
        ReputationVector::observe(
            &mut provider.safety,
            distinct(AttestationType::SafetyPass) / committee_len,
            alpha,
        );
        ReputationVector::observe(
            &mut provider.integrity,
            1.0 - distinct(AttestationType::Reject) / committee_len,
            alpha,
        );
        if receipt.amount_atomic > 0 {
            if let Some(cost) = receipt.metrics.get("cost_atomic").and_then(|v| v.as_f64()) {
                if cost > 0.0 {
                    let efficiency = (receipt.amount_atomic as f64 / cost).clamp(0.0, 1.0);
                    ReputationVector::observe(&mut provider.efficiency, efficiency, alpha);
                }
            }
        }
        provider.updated_at = now;
        self.reputations.insert(receipt.provider.clone(), provider);

        // committee validation dimension: consistent attestors up,
        // contradictory attestors down
        for member in &receipt.committee {
            let voted_pass = attestations.iter().any(|a| {
                &a.attestor == member && a.attestation_type == AttestationType::AuditPass
            });
            let voted_reject = attestations.iter().any(|a| {
                &a.attestor == member && a.attestation_type == AttestationType::Reject
            });
            let observation = match (finalized, voted_pass, voted_reject) {
                (true, true, false) | (false, false, true) => Some(1.0),
                (true, false, true) | (false, true, false) => Some(0.0),
                _ => None,
            };
            if let Some(observation) = observation {
                let mut rep = *self
                    .reputations
                    .entry(member.clone())
                    .or_insert_with(|| ReputationVector::neutral(now));
                ReputationVector::observe(&mut rep.validation, observation, alpha);
                rep.updated_at = now;
                self.reputations.insert(member.clone(), rep);
            }
        }
    }
}

/// `clamp(target / actual, 0, 1)` from two metric keys, when both exist.
fn ratio_observation(metrics: &serde_json::Value, target_key: &str, actual_key: &str) -> Option<f64> {
    let target = metrics.get(target_key)?.as_f64()?;
    let actual = metrics.get(actual_key)?.as_f64()?;
    if actual <= 0.0 {
        return None;
    }
    Some((target / actual).clamp(0.0, 1.0))
}
