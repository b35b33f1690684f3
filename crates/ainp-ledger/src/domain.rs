//! Ledger domain entities and error conditions.

use ainp_types::Did;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Ledger error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Account already exists for the agent.
    #[error("account already exists: {0}")]
    AccountExists(Did),

    /// No account for the agent.
    #[error("account not found: {0}")]
    AccountNotFound(Did),

    /// Available balance (balance minus reserved) is too low.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    /// Reservation smaller than the requested release.
    #[error("insufficient reservation: required {required}, reserved {reserved}")]
    InsufficientReserved { required: u64, reserved: u64 },

    /// Spend part of a release exceeds the released amount.
    #[error("spend {spent} exceeds released amount {released}")]
    SpendExceedsRelease { spent: u64, released: u64 },

    /// Same `(agent, type, intent_ref)` was already committed.
    #[error("duplicate transaction: {tx_type:?} ref {intent_ref}")]
    DuplicateTransaction { tx_type: TxType, intent_ref: String },

    /// Arithmetic overflow on an account field.
    #[error("amount overflow on account field")]
    Overflow,
}

/// Transaction types, the signed effect each has on the derived fields is
/// fixed (see [`CreditAccount::replay`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Deposit,
    Earn,
    Reserve,
    Release,
    Spend,
    /// Earn credited by the proof-of-usefulness pipeline.
    PouEarn,
}

/// Immutable, append-only transaction row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub agent: Did,
    pub tx_type: TxType,
    /// Atomic units; the sign is implied by `tx_type`.
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_ref: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: u64,
}

/// Per-agent account with derived fields. All amounts are non-negative
/// atomic units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAccount {
    pub agent: Did,
    pub balance: u64,
    pub reserved: u64,
    pub earned: u64,
    pub spent: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl CreditAccount {
    /// Fresh empty account.
    #[must_use]
    pub fn new(agent: Did, now_ms: u64) -> Self {
        Self {
            agent,
            balance: 0,
            reserved: 0,
            earned: 0,
            spent: 0,
            created_at: now_ms,
            updated_at: now_ms,
        }
    }

    /// Balance not held by reservations.
    #[must_use]
    pub fn available(&self) -> u64 {
        self.balance.saturating_sub(self.reserved)
    }

    /// Whether the account satisfies the ledger invariants.
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        self.balance >= self.reserved
    }

    /// Reconstruct derived fields from a transaction history.
    ///
    /// Used by tests and audits to check that committed rows reproduce the
    /// stored account exactly.
    #[must_use]
    pub fn replay(agent: Did, transactions: &[CreditTransaction]) -> Self {
        let mut account = Self::new(agent, 0);
        for tx in transactions {
            match tx.tx_type {
                TxType::Deposit => {
                    account.balance = account.balance.saturating_add(tx.amount);
                }
                TxType::Earn | TxType::PouEarn => {
                    account.balance = account.balance.saturating_add(tx.amount);
                    account.earned = account.earned.saturating_add(tx.amount);
                }
                TxType::Reserve => {
                    account.reserved = account.reserved.saturating_add(tx.amount);
                }
                TxType::Release => {
                    account.reserved = account.reserved.saturating_sub(tx.amount);
                }
                TxType::Spend => {
                    account.balance = account.balance.saturating_sub(tx.amount);
                    account.spent = account.spent.saturating_add(tx.amount);
                }
            }
            account.updated_at = tx.created_at;
        }
        account
    }
}
