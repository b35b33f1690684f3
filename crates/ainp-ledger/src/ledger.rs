//! # Ledger Service
//!
//! Row-locked account mutations. Each operation locks exactly one account
//! row, applies preconditions, mutates, and appends its transaction rows
//! inside the same critical section. Idempotency keys are checked under
//! the same lock, so a retried operation can never double-apply.

use crate::domain::{CreditAccount, CreditTransaction, LedgerError, TxType};
use ainp_types::{Clock, Did};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

struct AccountRow {
    account: CreditAccount,
    transactions: Vec<CreditTransaction>,
    /// Committed `(type, intent_ref)` pairs for idempotency.
    committed_refs: HashSet<(TxType, String)>,
}

/// The credit ledger. Cheap to clone via `Arc` at the composition root.
pub struct CreditLedger {
    clock: Arc<dyn Clock>,
    rows: DashMap<Did, Arc<Mutex<AccountRow>>>,
}

impl CreditLedger {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            rows: DashMap::new(),
        }
    }

    /// Create an account with an initial allocation.
    ///
    /// # Errors
    ///
    /// `LedgerError::AccountExists` when the agent already has a row.
    pub fn create_account(&self, agent: &Did, initial: u64) -> Result<CreditAccount, LedgerError> {
        let now = self.clock.now_ms();
        let mut account = CreditAccount::new(agent.clone(), now);
        let mut transactions = Vec::new();
        if initial > 0 {
            account.balance = initial;
            transactions.push(CreditTransaction {
                id: Uuid::new_v4(),
                agent: agent.clone(),
                tx_type: TxType::Deposit,
                amount: initial,
                intent_ref: None,
                proof_ref: None,
                metadata: serde_json::json!({"reason": "initial_allocation"}),
                created_at: now,
            });
        }
        let row = Arc::new(Mutex::new(AccountRow {
            account: account.clone(),
            transactions,
            committed_refs: HashSet::new(),
        }));
        // entry() keeps exactly one winner under concurrent registration
        match self.rows.entry(agent.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(LedgerError::AccountExists(agent.clone()))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(row);
            }
        }
        info!(agent = %agent, initial, "Credit account created");
        Ok(account)
    }

    /// Create the account if absent; returns the current snapshot either
    /// way. Registration uses this for idempotency.
    pub fn ensure_account(&self, agent: &Did, initial: u64) -> CreditAccount {
        match self.create_account(agent, initial) {
            Ok(account) => account,
            Err(_) => self.balance(agent).unwrap_or_else(|_| {
                // row vanished between calls; recreate empty
                CreditAccount::new(agent.clone(), self.clock.now_ms())
            }),
        }
    }

    /// Unconditional credit.
    pub fn deposit(
        &self,
        agent: &Did,
        amount: u64,
        metadata: serde_json::Value,
    ) -> Result<CreditAccount, LedgerError> {
        self.mutate(agent, |row, now| {
            row.account.balance = row
                .account
                .balance
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
            Ok(vec![Self::tx_row(
                agent,
                TxType::Deposit,
                amount,
                None,
                None,
                metadata.clone(),
                now,
            )])
        })
    }

    /// Hold part of the available balance against future settlement.
    pub fn reserve(
        &self,
        agent: &Did,
        amount: u64,
        intent_ref: &str,
    ) -> Result<CreditAccount, LedgerError> {
        self.mutate(agent, |row, now| {
            Self::check_idempotency(row, TxType::Reserve, intent_ref)?;
            let available = row.account.available();
            if available < amount {
                return Err(LedgerError::InsufficientBalance {
                    required: amount,
                    available,
                });
            }
            row.account.reserved = row
                .account
                .reserved
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
            row.committed_refs
                .insert((TxType::Reserve, intent_ref.to_string()));
            Ok(vec![Self::tx_row(
                agent,
                TxType::Reserve,
                amount,
                Some(intent_ref),
                None,
                serde_json::Value::Null,
                now,
            )])
        })
    }

    /// Release a reservation, spending part of it. `spent_amount` of the
    /// released hold leaves the balance; the remainder becomes available
    /// again.
    pub fn release(
        &self,
        agent: &Did,
        released_amount: u64,
        spent_amount: u64,
        intent_ref: &str,
    ) -> Result<CreditAccount, LedgerError> {
        self.mutate(agent, |row, now| {
            Self::check_idempotency(row, TxType::Release, intent_ref)?;
            if row.account.reserved < released_amount {
                return Err(LedgerError::InsufficientReserved {
                    required: released_amount,
                    reserved: row.account.reserved,
                });
            }
            if spent_amount > released_amount {
                return Err(LedgerError::SpendExceedsRelease {
                    spent: spent_amount,
                    released: released_amount,
                });
            }
            row.account.reserved -= released_amount;
            row.account.balance = row
                .account
                .balance
                .checked_sub(spent_amount)
                .ok_or(LedgerError::Overflow)?;
            row.account.spent = row
                .account
                .spent
                .checked_add(spent_amount)
                .ok_or(LedgerError::Overflow)?;
            row.committed_refs
                .insert((TxType::Release, intent_ref.to_string()));
            let mut rows = vec![Self::tx_row(
                agent,
                TxType::Release,
                released_amount,
                Some(intent_ref),
                None,
                serde_json::Value::Null,
                now,
            )];
            if spent_amount > 0 {
                rows.push(Self::tx_row(
                    agent,
                    TxType::Spend,
                    spent_amount,
                    Some(intent_ref),
                    None,
                    serde_json::Value::Null,
                    now,
                ));
            }
            Ok(rows)
        })
    }

    /// Credit earnings for settled or attested work.
    pub fn earn(
        &self,
        agent: &Did,
        amount: u64,
        tx_type: TxType,
        intent_ref: Option<&str>,
        proof_ref: Option<&str>,
        metadata: serde_json::Value,
    ) -> Result<CreditAccount, LedgerError> {
        debug_assert!(matches!(tx_type, TxType::Earn | TxType::PouEarn));
        self.mutate(agent, |row, now| {
            if let Some(r) = intent_ref {
                Self::check_idempotency(row, tx_type, r)?;
            }
            row.account.balance = row
                .account
                .balance
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
            row.account.earned = row
                .account
                .earned
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
            if let Some(r) = intent_ref {
                row.committed_refs.insert((tx_type, r.to_string()));
            }
            Ok(vec![Self::tx_row(
                agent,
                tx_type,
                amount,
                intent_ref,
                proof_ref,
                metadata.clone(),
                now,
            )])
        })
    }

    /// Debit available balance directly (postage, fees).
    pub fn spend(
        &self,
        agent: &Did,
        amount: u64,
        metadata: serde_json::Value,
    ) -> Result<CreditAccount, LedgerError> {
        self.mutate(agent, |row, now| {
            let available = row.account.available();
            if available < amount {
                return Err(LedgerError::InsufficientBalance {
                    required: amount,
                    available,
                });
            }
            row.account.balance -= amount;
            row.account.spent = row
                .account
                .spent
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
            Ok(vec![Self::tx_row(
                agent,
                TxType::Spend,
                amount,
                None,
                None,
                metadata.clone(),
                now,
            )])
        })
    }

    /// Current account snapshot.
    pub fn balance(&self, agent: &Did) -> Result<CreditAccount, LedgerError> {
        let row = self
            .rows
            .get(agent)
            .ok_or_else(|| LedgerError::AccountNotFound(agent.clone()))?;
        let guard = row.lock();
        Ok(guard.account.clone())
    }

    /// Most recent transactions, newest first.
    pub fn transactions(
        &self,
        agent: &Did,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>, LedgerError> {
        let row = self
            .rows
            .get(agent)
            .ok_or_else(|| LedgerError::AccountNotFound(agent.clone()))?;
        let guard = row.lock();
        Ok(guard.transactions.iter().rev().take(limit).cloned().collect())
    }

    /// Whether any account exists for the agent.
    #[must_use]
    pub fn has_account(&self, agent: &Did) -> bool {
        self.rows.contains_key(agent)
    }

    fn mutate<F>(&self, agent: &Did, op: F) -> Result<CreditAccount, LedgerError>
    where
        F: FnOnce(&mut AccountRow, u64) -> Result<Vec<CreditTransaction>, LedgerError>,
    {
        let row = self
            .rows
            .get(agent)
            .ok_or_else(|| LedgerError::AccountNotFound(agent.clone()))?
            .clone();
        let mut guard = row.lock();
        let now = self.clock.now_ms();
        let new_rows = op(&mut guard, now)?;
        guard.account.updated_at = now;
        for tx in &new_rows {
            debug!(agent = %agent, tx_type = ?tx.tx_type, amount = tx.amount, "Ledger commit");
        }
        guard.transactions.extend(new_rows);
        debug_assert!(guard.account.invariants_hold());
        Ok(guard.account.clone())
    }

    fn check_idempotency(
        row: &AccountRow,
        tx_type: TxType,
        intent_ref: &str,
    ) -> Result<(), LedgerError> {
        if row
            .committed_refs
            .contains(&(tx_type, intent_ref.to_string()))
        {
            return Err(LedgerError::DuplicateTransaction {
                tx_type,
                intent_ref: intent_ref.to_string(),
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn tx_row(
        agent: &Did,
        tx_type: TxType,
        amount: u64,
        intent_ref: Option<&str>,
        proof_ref: Option<&str>,
        metadata: serde_json::Value,
        now: u64,
    ) -> CreditTransaction {
        CreditTransaction {
            id: Uuid::new_v4(),
            agent: agent.clone(),
            tx_type,
            amount,
            intent_ref: intent_ref.map(str::to_string),
            proof_ref: proof_ref.map(str::to_string),
            metadata,
            created_at: now,
        }
    }
}
