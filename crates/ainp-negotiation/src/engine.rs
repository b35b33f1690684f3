//! # Negotiation Engine
//!
//! Session mutations run under the session's own lock; the transition is
//! validated against the current state inside the guard, so a losing
//! concurrent writer observes `InvalidStateTransition` rather than a lost
//! update. Ledger effects happen before the state flips to `accepted`, and
//! a failed reservation leaves the session untouched.

use crate::convergence::convergence_between;
use crate::domain::{
    Distribution, IncentiveSplit, NegotiationError, Round, Session, SessionState,
};
use crate::ports::{ReceiptContext, ReceiptSink, SessionNotifier};
use ainp_ledger::{CreditLedger, TxType};
use ainp_types::config::NegotiationConfig;
use ainp_types::{Clock, Did, ATOMIC_PER_CREDIT};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Treasury account receiving the broker share.
pub const BROKER_TREASURY: &str = "did:ainp:broker";

/// Treasury account receiving the pool share and flooring remainders.
pub const POOL_TREASURY: &str = "did:ainp:pool";

/// Result of a settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleOutcome {
    pub distribution: Distribution,
    /// Pending task receipt, when the receipt pipeline is wired.
    pub receipt_id: Option<Uuid>,
}

/// The negotiation engine.
pub struct NegotiationEngine {
    clock: Arc<dyn Clock>,
    config: NegotiationConfig,
    credits_enabled: bool,
    ledger: Arc<CreditLedger>,
    notifier: Arc<dyn SessionNotifier>,
    receipts: Arc<dyn ReceiptSink>,
    sessions: DashMap<Uuid, Arc<Mutex<Session>>>,
}

impl NegotiationEngine {
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        config: NegotiationConfig,
        credits_enabled: bool,
        ledger: Arc<CreditLedger>,
        notifier: Arc<dyn SessionNotifier>,
        receipts: Arc<dyn ReceiptSink>,
    ) -> Self {
        Self {
            clock,
            config,
            credits_enabled,
            ledger,
            notifier,
            receipts,
            sessions: DashMap::new(),
        }
    }

    /// Open a session with the initiator's first proposal as round 0.
    pub async fn initiate(
        &self,
        intent_id: String,
        initiator: Did,
        responder: Did,
        initial_proposal: serde_json::Value,
        max_rounds: Option<u32>,
        ttl_minutes: Option<u64>,
    ) -> Result<Session, NegotiationError> {
        if initiator == responder {
            return Err(NegotiationError::SameParty);
        }
        let max_rounds = max_rounds.unwrap_or(self.config.max_rounds).clamp(1, 20);
        let now = self.clock.now_ms();
        let ttl_ms = ttl_minutes
            .map(|m| m * 60_000)
            .unwrap_or(self.config.ttl_ms);

        let session = Session {
            id: Uuid::new_v4(),
            intent_id,
            initiator: initiator.clone(),
            responder: responder.clone(),
            state: SessionState::Initiated,
            rounds: vec![Round {
                actor: initiator,
                proposal: initial_proposal.clone(),
                created_at: now,
            }],
            convergence: 0.0,
            current_proposal: initial_proposal,
            final_proposal: None,
            reserved_atomic: 0,
            incentive_split: IncentiveSplit::default(),
            max_rounds,
            settled: false,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl_ms,
        };
        self.sessions
            .insert(session.id, Arc::new(Mutex::new(session.clone())));
        info!(session = %session.id, initiator = %session.initiator, responder = %session.responder, "Negotiation initiated");

        self.notifier
            .notify(&session.responder, "negotiation.initiated", &session)
            .await;
        Ok(session)
    }

    /// Record a counter-proposal.
    pub async fn counter(
        &self,
        session_id: Uuid,
        actor: &Did,
        proposal: serde_json::Value,
    ) -> Result<Session, NegotiationError> {
        let now = self.clock.now_ms();
        let (snapshot, peer) = {
            let handle = self.handle(session_id)?;
            let mut session = handle.lock();
            self.guard_live(&mut session, now)?;
            if !session.is_participant(actor) {
                return Err(NegotiationError::NotAParticipant(actor.clone()));
            }
            let next_state = session.state.after_counter().ok_or(
                NegotiationError::InvalidStateTransition {
                    state: session.state,
                    action: "counter",
                },
            )?;
            if session.latest_actor() == Some(actor) {
                return Err(NegotiationError::SameActorTwice(actor.clone()));
            }
            if session.rounds.len() as u32 >= session.max_rounds {
                return Err(NegotiationError::MaxRounds(session.max_rounds));
            }

            if let Some(score) = convergence_between(&session.current_proposal, &proposal) {
                session.convergence = score;
                if score >= self.config.convergence_threshold {
                    info!(session = %session_id, convergence = score, "Proposals converged, ready to accept");
                }
            }
            session.rounds.push(Round {
                actor: actor.clone(),
                proposal: proposal.clone(),
                created_at: now,
            });
            session.current_proposal = proposal;
            session.state = next_state;
            session.updated_at = now;
            let peer = session.peer_of(actor).clone();
            (session.clone(), peer)
        };
        debug!(session = %session_id, convergence = snapshot.convergence, "Counter recorded");
        self.notifier
            .notify(&peer, "negotiation.countered", &snapshot)
            .await;
        Ok(snapshot)
    }

    /// Accept the current proposal. The acceptor must be the peer that did
    /// not make the latest proposal. With credits enabled and a priced
    /// proposal, the price is reserved from the initiator first; a failed
    /// reservation leaves the state unchanged.
    pub async fn accept(
        &self,
        session_id: Uuid,
        actor: &Did,
    ) -> Result<Session, NegotiationError> {
        let now = self.clock.now_ms();
        let (snapshot, peer) = {
            let handle = self.handle(session_id)?;
            let mut session = handle.lock();
            self.guard_live(&mut session, now)?;
            if !session.is_participant(actor) {
                return Err(NegotiationError::NotAParticipant(actor.clone()));
            }
            if session.state.is_terminal() {
                return Err(NegotiationError::InvalidStateTransition {
                    state: session.state,
                    action: "accept",
                });
            }
            if session.latest_actor() == Some(actor) {
                return Err(NegotiationError::SameActorTwice(actor.clone()));
            }

            let mut reserved = 0;
            if self.credits_enabled {
                if let Some(price) = price_atomic(&session.current_proposal) {
                    let reference = format!("neg:{session_id}");
                    self.ledger.reserve(&session.initiator, price, &reference)?;
                    reserved = price;
                }
            }

            session.state = SessionState::Accepted;
            session.final_proposal = Some(session.current_proposal.clone());
            session.reserved_atomic = reserved;
            session.updated_at = now;
            let peer = session.peer_of(actor).clone();
            (session.clone(), peer)
        };
        info!(session = %session_id, reserved = snapshot.reserved_atomic, "Negotiation accepted");
        self.notifier
            .notify(&peer, "negotiation.accepted", &snapshot)
            .await;
        Ok(snapshot)
    }

    /// Reject from any non-terminal state.
    pub async fn reject(
        &self,
        session_id: Uuid,
        actor: &Did,
    ) -> Result<Session, NegotiationError> {
        let now = self.clock.now_ms();
        let (snapshot, peer) = {
            let handle = self.handle(session_id)?;
            let mut session = handle.lock();
            self.guard_live(&mut session, now)?;
            if !session.is_participant(actor) {
                return Err(NegotiationError::NotAParticipant(actor.clone()));
            }
            if session.state.is_terminal() {
                return Err(NegotiationError::InvalidStateTransition {
                    state: session.state,
                    action: "reject",
                });
            }
            session.state = SessionState::Rejected;
            session.updated_at = now;
            let peer = session.peer_of(actor).clone();
            (session.clone(), peer)
        };
        self.notifier
            .notify(&peer, "negotiation.rejected", &snapshot)
            .await;
        Ok(snapshot)
    }

    /// Settle an accepted session once the work is delivered: the
    /// reservation is spent from the initiator, the split distributed, and
    /// a pending task receipt created.
    pub async fn settle(
        &self,
        session_id: Uuid,
        caller: &Did,
        split: Option<IncentiveSplit>,
        validator_did: Option<Did>,
        usefulness_proof_id: Option<String>,
    ) -> Result<SettleOutcome, NegotiationError> {
        let now = self.clock.now_ms();
        let (distribution, context, snapshot) = {
            let handle = self.handle(session_id)?;
            let mut session = handle.lock();
            if !session.is_participant(caller) {
                return Err(NegotiationError::NotAParticipant(caller.clone()));
            }
            if session.state != SessionState::Accepted {
                return Err(NegotiationError::InvalidStateTransition {
                    state: session.state,
                    action: "settle",
                });
            }
            if session.settled {
                return Err(NegotiationError::AlreadySettled);
            }
            let split = split.unwrap_or(session.incentive_split);
            if !split.is_valid() {
                return Err(NegotiationError::InvalidSplit);
            }

            let total = session.reserved_atomic;
            let distribution = split.distribute(total);
            if self.credits_enabled && total > 0 {
                self.apply_distribution(&session, &distribution, validator_did.as_ref(), usefulness_proof_id.as_deref())?;
            }

            session.settled = true;
            session.incentive_split = split;
            session.updated_at = now;
            let context = ReceiptContext {
                intent_id: session.intent_id.clone(),
                provider: session.responder.clone(),
                client: session.initiator.clone(),
                amount_atomic: total,
                validator_did,
                usefulness_proof_id,
            };
            (distribution, context, session.clone())
        };

        let receipt_id = self.receipts.create_receipt(context).await;
        info!(
            session = %session_id,
            agent = distribution.agent,
            broker = distribution.broker,
            validator = distribution.validator,
            pool = distribution.pool,
            receipt = ?receipt_id,
            "Negotiation settled"
        );
        self.notifier
            .notify(&snapshot.responder, "negotiation.settled", &snapshot)
            .await;
        Ok(SettleOutcome {
            distribution,
            receipt_id,
        })
    }

    /// Session snapshot; lazily expires overdue sessions.
    pub async fn get(&self, session_id: Uuid) -> Result<Session, NegotiationError> {
        let now = self.clock.now_ms();
        let (snapshot, expired_parties) = {
            let handle = self.handle(session_id)?;
            let mut session = handle.lock();
            let expired = self.expire_if_due(&mut session, now);
            (session.clone(), expired)
        };
        self.dispatch_expiry(&snapshot, expired_parties).await;
        Ok(snapshot)
    }

    /// Sessions filtered by participant and/or state.
    #[must_use]
    pub fn list(&self, agent: Option<&Did>, state: Option<SessionState>) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .map(|entry| entry.value().lock().clone())
            .filter(|s| agent.map_or(true, |a| s.is_participant(a)))
            .filter(|s| state.map_or(true, |st| s.state == st))
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    /// Background sweep: expire every overdue non-terminal session.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut expired = Vec::new();
        for entry in self.sessions.iter() {
            let mut session = entry.value().lock();
            if self.expire_if_due(&mut session, now) {
                expired.push(session.clone());
            }
        }
        let count = expired.len();
        for session in expired {
            self.dispatch_expiry(&session, true).await;
        }
        if count > 0 {
            warn!(count, "Expired overdue negotiation sessions");
        }
        count
    }

    fn handle(&self, session_id: Uuid) -> Result<Arc<Mutex<Session>>, NegotiationError> {
        self.sessions
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .ok_or(NegotiationError::NotFound(session_id))
    }

    /// Expire overdue sessions, then fail the call when terminal-by-expiry.
    fn guard_live(&self, session: &mut Session, now: u64) -> Result<(), NegotiationError> {
        if self.expire_if_due(session, now) || session.state == SessionState::Expired {
            return Err(NegotiationError::Expired(session.id));
        }
        Ok(())
    }

    fn expire_if_due(&self, session: &mut Session, now: u64) -> bool {
        if !session.state.is_terminal() && session.expires_at < now {
            session.state = SessionState::Expired;
            session.updated_at = now;
            return true;
        }
        false
    }

    async fn dispatch_expiry(&self, session: &Session, expired: bool) {
        if expired {
            self.notifier
                .notify(&session.initiator, "negotiation.expired", session)
                .await;
            self.notifier
                .notify(&session.responder, "negotiation.expired", session)
                .await;
        }
    }

    fn apply_distribution(
        &self,
        session: &Session,
        distribution: &Distribution,
        validator_did: Option<&Did>,
        usefulness_proof_id: Option<&str>,
    ) -> Result<(), NegotiationError> {
        let reference = format!("neg:{}", session.id);
        // spend the whole reservation from the initiator
        self.ledger.release(
            &session.initiator,
            session.reserved_atomic,
            session.reserved_atomic,
            &reference,
        )?;

        let broker = treasury(BROKER_TREASURY);
        let pool = treasury(POOL_TREASURY);
        let mut payouts: Vec<(Did, u64, &str)> =
            vec![(session.responder.clone(), distribution.agent, "agent")];
        payouts.push((broker, distribution.broker, "broker"));
        match validator_did {
            Some(validator) => payouts.push((validator.clone(), distribution.validator, "validator")),
            // no validator engaged: their share joins the pool
            None => payouts.push((treasury(POOL_TREASURY), distribution.validator, "validator")),
        }
        payouts.push((pool, distribution.pool, "pool"));

        for (recipient, amount, role) in payouts {
            if amount == 0 {
                continue;
            }
            self.ledger.ensure_account(&recipient, 0);
            self.ledger.earn(
                &recipient,
                amount,
                TxType::Earn,
                Some(&format!("{reference}:{role}")),
                usefulness_proof_id,
                serde_json::json!({"session": session.id.to_string(), "role": role}),
            )?;
        }
        Ok(())
    }
}

fn price_atomic(proposal: &serde_json::Value) -> Option<u64> {
    if let Some(atomic) = proposal.get("price_atomic").and_then(|v| v.as_u64()) {
        return Some(atomic);
    }
    proposal
        .get("price")
        .and_then(|v| v.as_f64())
        .filter(|p| *p > 0.0)
        .map(|credits| (credits * ATOMIC_PER_CREDIT as f64).round() as u64)
}

fn treasury(did: &str) -> Did {
    Did::parse(did).unwrap_or_else(|_| unreachable!("treasury identifiers are well-formed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{NoopNotifier, NoopReceiptSink};
    use ainp_types::ManualClock;
    use serde_json::json;

    fn did(s: &str) -> Did {
        Did::parse(format!("did:key:z{s}")).unwrap()
    }

    fn engine_with(
        credits: bool,
    ) -> (Arc<ManualClock>, Arc<CreditLedger>, NegotiationEngine) {
        let clock = ManualClock::at(1_000_000);
        let ledger = Arc::new(CreditLedger::new(clock.clone()));
        let engine = NegotiationEngine::new(
            clock.clone(),
            NegotiationConfig::default(),
            credits,
            ledger.clone(),
            Arc::new(NoopNotifier),
            Arc::new(NoopReceiptSink),
        );
        (clock, ledger, engine)
    }

    async fn accepted_session(
        ledger: &CreditLedger,
        engine: &NegotiationEngine,
    ) -> Session {
        ledger.create_account(&did("A"), 1_000_000).unwrap();
        ledger.create_account(&did("B"), 0).unwrap();
        let session = engine
            .initiate(
                "intent-1".into(),
                did("A"),
                did("B"),
                json!({"price": 100}),
                None,
                None,
            )
            .await
            .unwrap();
        engine
            .counter(session.id, &did("B"), json!({"price": 80}))
            .await
            .unwrap();
        engine
            .counter(session.id, &did("A"), json!({"price": 90}))
            .await
            .unwrap();
        engine.accept(session.id, &did("B")).await.unwrap()
    }

    #[tokio::test]
    async fn test_full_cycle_states_and_convergence() {
        let (_, ledger, engine) = engine_with(true);
        ledger.create_account(&did("A"), 1_000_000).unwrap();
        let session = engine
            .initiate("i".into(), did("A"), did("B"), json!({"price": 100}), None, None)
            .await
            .unwrap();
        assert_eq!(session.state, SessionState::Initiated);

        let after_b = engine
            .counter(session.id, &did("B"), json!({"price": 80}))
            .await
            .unwrap();
        assert_eq!(after_b.state, SessionState::Proposed);
        let c1 = after_b.convergence;

        let after_a = engine
            .counter(session.id, &did("A"), json!({"price": 90}))
            .await
            .unwrap();
        assert_eq!(after_a.state, SessionState::CounterProposed);
        assert!(after_a.convergence >= c1);

        let accepted = engine.accept(session.id, &did("B")).await.unwrap();
        assert_eq!(accepted.state, SessionState::Accepted);
        assert_eq!(accepted.reserved_atomic, 90_000);
        assert_eq!(ledger.balance(&did("A")).unwrap().reserved, 90_000);
    }

    #[tokio::test]
    async fn test_same_party_rejected() {
        let (_, _, engine) = engine_with(false);
        let err = engine
            .initiate("i".into(), did("A"), did("A"), json!({}), None, None)
            .await
            .unwrap_err();
        assert_eq!(err, NegotiationError::SameParty);
    }

    #[tokio::test]
    async fn test_actor_must_alternate() {
        let (_, _, engine) = engine_with(false);
        let session = engine
            .initiate("i".into(), did("A"), did("B"), json!({"price": 100}), None, None)
            .await
            .unwrap();
        let err = engine
            .counter(session.id, &did("A"), json!({"price": 95}))
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::SameActorTwice(_)));
    }

    #[tokio::test]
    async fn test_latest_proposer_cannot_accept() {
        let (_, _, engine) = engine_with(false);
        let session = engine
            .initiate("i".into(), did("A"), did("B"), json!({"price": 100}), None, None)
            .await
            .unwrap();
        engine
            .counter(session.id, &did("B"), json!({"price": 80}))
            .await
            .unwrap();
        // B made the latest proposal, so B cannot accept it
        let err = engine.accept(session.id, &did("B")).await.unwrap_err();
        assert!(matches!(err, NegotiationError::SameActorTwice(_)));
        // A can
        assert!(engine.accept(session.id, &did("A")).await.is_ok());
    }

    #[tokio::test]
    async fn test_outsider_rejected() {
        let (_, _, engine) = engine_with(false);
        let session = engine
            .initiate("i".into(), did("A"), did("B"), json!({"price": 1}), None, None)
            .await
            .unwrap();
        let err = engine
            .counter(session.id, &did("Z"), json!({"price": 2}))
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::NotAParticipant(_)));
    }

    #[tokio::test]
    async fn test_max_rounds_enforced() {
        let (_, _, engine) = engine_with(false);
        let session = engine
            .initiate("i".into(), did("A"), did("B"), json!({"price": 100}), Some(2), None)
            .await
            .unwrap();
        engine
            .counter(session.id, &did("B"), json!({"price": 90}))
            .await
            .unwrap();
        let err = engine
            .counter(session.id, &did("A"), json!({"price": 95}))
            .await
            .unwrap_err();
        assert_eq!(err, NegotiationError::MaxRounds(2));
    }

    #[tokio::test]
    async fn test_reservation_failure_keeps_state() {
        let (_, ledger, engine) = engine_with(true);
        ledger.create_account(&did("A"), 50_000).unwrap();
        let session = engine
            .initiate("i".into(), did("A"), did("B"), json!({"price": 100}), None, None)
            .await
            .unwrap();
        engine
            .counter(session.id, &did("B"), json!({"price": 90}))
            .await
            .unwrap();
        let err = engine.accept(session.id, &did("A")).await.unwrap_err();
        assert!(matches!(err, NegotiationError::Ledger(_)));
        let unchanged = engine.get(session.id).await.unwrap();
        assert_eq!(unchanged.state, SessionState::Proposed);
        assert_eq!(ledger.balance(&did("A")).unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_settlement_distribution() {
        let (_, ledger, engine) = engine_with(true);
        let session = accepted_session(&ledger, &engine).await;

        let outcome = engine
            .settle(session.id, &did("A"), None, None, None)
            .await
            .unwrap();
        assert_eq!(outcome.distribution.agent, 63_000);
        assert_eq!(outcome.distribution.broker, 9_000);
        assert_eq!(outcome.distribution.validator, 9_000);
        assert_eq!(outcome.distribution.pool, 9_000);

        let initiator = ledger.balance(&did("A")).unwrap();
        assert_eq!(initiator.reserved, 0);
        assert_eq!(initiator.spent, 90_000);
        assert_eq!(initiator.balance, 910_000);

        let provider = ledger.balance(&did("B")).unwrap();
        assert_eq!(provider.balance, 63_000);
        assert_eq!(provider.earned, 63_000);

        let pool = ledger.balance(&treasury(POOL_TREASURY)).unwrap();
        // validator share joins the pool when no validator was engaged
        assert_eq!(pool.balance, 18_000);
    }

    #[tokio::test]
    async fn test_double_settle_rejected() {
        let (_, ledger, engine) = engine_with(true);
        let session = accepted_session(&ledger, &engine).await;
        engine
            .settle(session.id, &did("A"), None, None, None)
            .await
            .unwrap();
        let err = engine
            .settle(session.id, &did("A"), None, None, None)
            .await
            .unwrap_err();
        assert_eq!(err, NegotiationError::AlreadySettled);
    }

    #[tokio::test]
    async fn test_invalid_split_rejected() {
        let (_, ledger, engine) = engine_with(true);
        let session = accepted_session(&ledger, &engine).await;
        let err = engine
            .settle(
                session.id,
                &did("A"),
                Some(IncentiveSplit {
                    agent: 0.9,
                    broker: 0.3,
                    validator: 0.0,
                    pool: 0.0,
                }),
                None,
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err, NegotiationError::InvalidSplit);
    }

    #[tokio::test]
    async fn test_expiry_on_access_and_sweep() {
        let (clock, _, engine) = engine_with(false);
        let session = engine
            .initiate("i".into(), did("A"), did("B"), json!({"price": 1}), None, Some(1))
            .await
            .unwrap();
        clock.advance_ms(61_000);
        let expired = engine.get(session.id).await.unwrap();
        assert_eq!(expired.state, SessionState::Expired);

        // terminal sessions stay terminal
        let err = engine
            .counter(session.id, &did("B"), json!({"price": 2}))
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::Expired(_)));

        let other = engine
            .initiate("j".into(), did("A"), did("B"), json!({"price": 1}), None, Some(1))
            .await
            .unwrap();
        clock.advance_ms(61_000);
        assert_eq!(engine.sweep_expired().await, 1);
        assert_eq!(
            engine.get(other.id).await.unwrap().state,
            SessionState::Expired
        );
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (_, _, engine) = engine_with(false);
        engine
            .initiate("i".into(), did("A"), did("B"), json!({"price": 1}), None, None)
            .await
            .unwrap();
        engine
            .initiate("j".into(), did("C"), did("D"), json!({"price": 1}), None, None)
            .await
            .unwrap();
        assert_eq!(engine.list(Some(&did("A")), None).len(), 1);
        assert_eq!(engine.list(None, Some(SessionState::Initiated)).len(), 2);
        assert_eq!(engine.list(Some(&did("Z")), None).len(), 0);
    }

    #[tokio::test]
    async fn test_credits_disabled_skips_ledger() {
        let (_, ledger, engine) = engine_with(false);
        let session = engine
            .initiate("i".into(), did("A"), did("B"), json!({"price": 100}), None, None)
            .await
            .unwrap();
        engine
            .counter(session.id, &did("B"), json!({"price": 90}))
            .await
            .unwrap();
        let accepted = engine.accept(session.id, &did("A")).await.unwrap();
        assert_eq!(accepted.reserved_atomic, 0);
        let outcome = engine
            .settle(session.id, &did("A"), None, None, None)
            .await
            .unwrap();
        assert_eq!(outcome.distribution.total(), 0);
        assert!(!ledger.has_account(&did("A")));
    }
}
