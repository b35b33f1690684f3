//! # Usefulness Aggregation
//!
//! Proof submission and the scheduled job that recomputes each agent's
//! 30-day rolling usefulness and writes it back to the discovery cache.
//! The job tolerates partial failure (one agent's error logs and the run
//! continues) and is re-entrant: overlapping runs converge because the
//! last writer wins on the cache.

use crate::domain::{PouError, UsefulnessProof};
use crate::ports::UsefulnessSink;
use crate::scoring::{score_proof, validate_proof};
use ainp_types::{Clock, Did};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Rolling window and decay half-life (30 days).
const WINDOW_MS: u64 = 30 * 24 * 3_600_000;

/// The usefulness proof store and aggregator.
pub struct UsefulnessService {
    clock: Arc<dyn Clock>,
    /// Freshness skew accepted on submitted proofs.
    skew_ms: u64,
    sink: Arc<dyn UsefulnessSink>,
    proofs: DashMap<Did, Vec<UsefulnessProof>>,
}

impl UsefulnessService {
    /// Default proof freshness skew (5 minutes).
    pub const DEFAULT_SKEW_MS: u64 = 300_000;

    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, skew_ms: u64, sink: Arc<dyn UsefulnessSink>) -> Self {
        Self {
            clock,
            skew_ms,
            sink,
            proofs: DashMap::new(),
        }
    }

    /// Validate and store a proof; returns its immediate score.
    pub fn submit_proof(&self, proof: UsefulnessProof) -> Result<f64, PouError> {
        let now = self.clock.now_ms();
        validate_proof(&proof, now, self.skew_ms)?;
        let score = score_proof(&proof);
        debug!(agent = %proof.agent, work_type = ?proof.work_type, score, "Usefulness proof accepted");
        self.proofs.entry(proof.agent.clone()).or_default().push(proof);
        Ok(score)
    }

    /// Proofs stored for an agent within the rolling window.
    #[must_use]
    pub fn recent_proofs(&self, agent: &Did) -> Vec<UsefulnessProof> {
        let cutoff = self.clock.now_ms().saturating_sub(WINDOW_MS);
        self.proofs
            .get(agent)
            .map(|proofs| {
                proofs
                    .iter()
                    .filter(|p| p.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rolling score for one agent: per-proof scores weighted by
    /// exponential time decay with a 30-day half-life.
    #[must_use]
    pub fn rolling_score(&self, agent: &Did) -> Option<f64> {
        let now = self.clock.now_ms();
        let proofs = self.recent_proofs(agent);
        if proofs.is_empty() {
            return None;
        }
        let mut weighted = 0.0;
        let mut weights = 0.0;
        for proof in &proofs {
            let age_days = now.saturating_sub(proof.timestamp) as f64 / 86_400_000.0;
            let weight = 0.5f64.powf(age_days / 30.0);
            weighted += score_proof(proof) * weight;
            weights += weight;
        }
        Some((weighted / weights).clamp(0.0, 100.0))
    }

    /// One aggregation pass over every agent with recent activity. Also
    /// prunes proofs that fell out of the window. Returns the number of
    /// agents written.
    pub fn aggregate(&self) -> usize {
        let now = self.clock.now_ms();
        let cutoff = now.saturating_sub(WINDOW_MS);
        let agents: Vec<Did> = self.proofs.iter().map(|entry| entry.key().clone()).collect();
        let mut written = 0;
        for agent in agents {
            if let Some(mut proofs) = self.proofs.get_mut(&agent) {
                proofs.retain(|p| p.timestamp >= cutoff);
            }
            let Some(score) = self.rolling_score(&agent) else {
                continue;
            };
            self.sink.write_usefulness(&agent, score);
            written += 1;
        }
        if written > 0 {
            info!(agents = written, "Usefulness aggregation pass complete");
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkType;
    use ainp_types::ManualClock;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct RecordingSink(Mutex<Vec<(Did, f64)>>);

    impl UsefulnessSink for RecordingSink {
        fn write_usefulness(&self, agent: &Did, score: f64) {
            self.0.lock().push((agent.clone(), score));
        }
    }

    fn did(s: &str) -> Did {
        Did::parse(format!("did:key:z{s}")).unwrap()
    }

    fn proof(agent: &str, compute_ms: f64, timestamp: u64) -> UsefulnessProof {
        UsefulnessProof {
            id: Uuid::new_v4(),
            agent: did(agent),
            work_type: WorkType::Compute,
            metrics: HashMap::from([("compute_ms".to_string(), compute_ms)]),
            attestations: Vec::new(),
            trace_id: "t".into(),
            timestamp,
        }
    }

    #[test]
    fn test_submit_validates_freshness() {
        let clock = ManualClock::at(10_000_000);
        let service =
            UsefulnessService::new(clock, UsefulnessService::DEFAULT_SKEW_MS, Arc::new(crate::ports::NullSink));
        assert!(service.submit_proof(proof("A", 10_000.0, 10_000_000)).is_ok());
        assert!(service.submit_proof(proof("A", 10_000.0, 1_000)).is_err());
    }

    #[test]
    fn test_rolling_score_weights_recent_higher() {
        let clock = ManualClock::at(WINDOW_MS + 1_000_000);
        let service = UsefulnessService::new(
            clock.clone(),
            u64::MAX / 4, // freshness not under test
            Arc::new(crate::ports::NullSink),
        );
        let now = clock.now_ms();
        // an old weak proof and a recent strong one
        service
            .submit_proof(proof("A", 5_000.0, now - 29 * 86_400_000))
            .unwrap();
        service.submit_proof(proof("A", 35_000.0, now)).unwrap();
        let score = service.rolling_score(&did("A")).unwrap();
        // plain mean would be 20; decay pulls toward the recent 35
        assert!(score > 20.0);
        assert!(score < 35.0);
    }

    #[test]
    fn test_aggregate_writes_to_sink_and_prunes() {
        let clock = ManualClock::at(WINDOW_MS + 1_000_000);
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        let service = UsefulnessService::new(clock.clone(), u64::MAX / 4, sink.clone());
        let now = clock.now_ms();
        service.submit_proof(proof("A", 10_000.0, now)).unwrap();
        // out-of-window proof only
        service
            .submit_proof(proof("B", 10_000.0, now - WINDOW_MS - 1))
            .unwrap();

        let written = service.aggregate();
        assert_eq!(written, 1);
        let writes = sink.0.lock();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, did("A"));
        assert!((writes[0].1 - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_activity_no_score() {
        let clock = ManualClock::at(1_000_000);
        let service = UsefulnessService::new(
            clock,
            UsefulnessService::DEFAULT_SKEW_MS,
            Arc::new(crate::ports::NullSink),
        );
        assert!(service.rolling_score(&did("Z")).is_none());
        assert_eq!(service.aggregate(), 0);
    }
}
