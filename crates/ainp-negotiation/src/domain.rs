//! Negotiation domain entities.

use ainp_ledger::LedgerError;
use ainp_types::Did;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Tolerance when checking that an incentive split sums to 1.
const SPLIT_EPSILON: f64 = 1e-6;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initiated,
    Proposed,
    CounterProposed,
    Accepted,
    Rejected,
    Expired,
}

impl SessionState {
    /// Terminal states never transition again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Accepted | SessionState::Rejected | SessionState::Expired
        )
    }

    /// The state a counter-proposal moves the session into.
    #[must_use]
    pub fn after_counter(&self) -> Option<SessionState> {
        match self {
            SessionState::Initiated => Some(SessionState::Proposed),
            SessionState::Proposed | SessionState::CounterProposed => {
                Some(SessionState::CounterProposed)
            }
            _ => None,
        }
    }
}

/// One proposal round, append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub actor: Did,
    pub proposal: serde_json::Value,
    pub created_at: u64,
}

/// Settlement split across the participating roles. Must sum to 1 within
/// floating tolerance; integer flooring remainders accrue to `pool`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IncentiveSplit {
    pub agent: f64,
    pub broker: f64,
    pub validator: f64,
    pub pool: f64,
}

impl Default for IncentiveSplit {
    fn default() -> Self {
        Self {
            agent: 0.7,
            broker: 0.1,
            validator: 0.1,
            pool: 0.1,
        }
    }
}

impl IncentiveSplit {
    /// Whether the shares are non-negative and sum to 1.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let shares = [self.agent, self.broker, self.validator, self.pool];
        shares.iter().all(|s| *s >= 0.0)
            && (shares.iter().sum::<f64>() - 1.0).abs() <= SPLIT_EPSILON
    }

    /// Distribute `total` atomic units. The three named roles are floored;
    /// the pool absorbs the remainder.
    #[must_use]
    pub fn distribute(&self, total: u64) -> Distribution {
        let floor_share = |share: f64| -> u64 {
            let amount = (total as f64) * share;
            amount.floor() as u64
        };
        let agent = floor_share(self.agent);
        let broker = floor_share(self.broker);
        let validator = floor_share(self.validator);
        let pool = total
            .saturating_sub(agent)
            .saturating_sub(broker)
            .saturating_sub(validator);
        Distribution {
            agent,
            broker,
            validator,
            pool,
        }
    }
}

/// Concrete atomic amounts of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub agent: u64,
    pub broker: u64,
    pub validator: u64,
    pub pool: u64,
}

impl Distribution {
    /// Sum of all shares; equals the settled total.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.agent + self.broker + self.validator + self.pool
    }
}

/// A negotiation session row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub intent_id: String,
    pub initiator: Did,
    pub responder: Did,
    pub state: SessionState,
    /// Append-only proposal log; round 0 is the initial proposal.
    pub rounds: Vec<Round>,
    /// Convergence score in [0,1] after the latest counter.
    pub convergence: f64,
    pub current_proposal: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_proposal: Option<serde_json::Value>,
    /// Atomic units held from the initiator on accept.
    pub reserved_atomic: u64,
    pub incentive_split: IncentiveSplit,
    pub max_rounds: u32,
    /// Set once settlement has distributed the reservation.
    pub settled: bool,
    pub created_at: u64,
    pub updated_at: u64,
    pub expires_at: u64,
}

impl Session {
    /// Actor of the most recent round.
    #[must_use]
    pub fn latest_actor(&self) -> Option<&Did> {
        self.rounds.last().map(|round| &round.actor)
    }

    /// Whether the agent is a session participant.
    #[must_use]
    pub fn is_participant(&self, agent: &Did) -> bool {
        &self.initiator == agent || &self.responder == agent
    }

    /// The peer of a participant.
    #[must_use]
    pub fn peer_of(&self, agent: &Did) -> &Did {
        if &self.initiator == agent {
            &self.responder
        } else {
            &self.initiator
        }
    }
}

/// Negotiation errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NegotiationError {
    #[error("session not found: {0}")]
    NotFound(Uuid),

    #[error("invalid state transition from {state:?} via {action}")]
    InvalidStateTransition { state: SessionState, action: &'static str },

    #[error("session {0} has expired")]
    Expired(Uuid),

    #[error("max rounds ({0}) reached")]
    MaxRounds(u32),

    #[error("agent {0} is not a participant")]
    NotAParticipant(Did),

    #[error("actor {0} already made the latest proposal")]
    SameActorTwice(Did),

    #[error("initiator and responder must differ")]
    SameParty,

    #[error("incentive split does not sum to 1")]
    InvalidSplit,

    #[error("already settled")]
    AlreadySettled,

    /// Credit reservation or settlement failed; state is unchanged.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
