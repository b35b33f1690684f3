//! # Payment Requests
//!
//! Top-up challenges and their settlement. A payment request is created by
//! (or on behalf of) an agent, handed out in `402` challenges, and settled
//! when the external provider's webhook confirms payment. Confirmation
//! deposits into the ledger and appends an immutable payment receipt;
//! settlement is idempotent on the provider transaction reference.

use crate::domain::LedgerError;
use crate::ledger::CreditLedger;
use ainp_types::{Clock, Did};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Payment settlement rails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Credits,
    Coinbase,
    Lightning,
    Usdc,
}

/// Request lifecycle. Transitions are monotone; a terminal status never
/// changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Pending,
    Paid,
    Expired,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    /// Whether the status can still move.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, PaymentStatus::Created | PaymentStatus::Pending)
    }
}

/// A top-up request awaiting settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: Uuid,
    pub owner: Did,
    pub amount_atomic: u64,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Immutable settlement record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub request_id: Uuid,
    pub provider: String,
    pub tx_ref: String,
    pub amount_atomic: u64,
    pub confirmed_at: u64,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Payment errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PaymentError {
    #[error("payment request not found: {0}")]
    NotFound(Uuid),

    #[error("amount must be positive")]
    ZeroAmount,

    #[error("payment request {id} is {status:?}, not open")]
    NotOpen { id: Uuid, status: PaymentStatus },

    #[error("provider tx {0} already settled")]
    AlreadySettled(String),

    #[error("caller {caller} does not own payment request {id}")]
    NotOwner { id: Uuid, caller: Did },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Payment request store and settlement path.
pub struct PaymentService {
    clock: Arc<dyn Clock>,
    ledger: Arc<CreditLedger>,
    requests: DashMap<Uuid, PaymentRequest>,
    receipts: Mutex<Vec<PaymentReceipt>>,
    settled_tx_refs: DashMap<String, Uuid>,
}

impl PaymentService {
    /// Default request lifetime when none is supplied (15 minutes).
    pub const DEFAULT_EXPIRY_SECS: u64 = 900;

    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, ledger: Arc<CreditLedger>) -> Self {
        Self {
            clock,
            ledger,
            requests: DashMap::new(),
            receipts: Mutex::new(Vec::new()),
            settled_tx_refs: DashMap::new(),
        }
    }

    /// Create a top-up request.
    ///
    /// # Errors
    ///
    /// `PaymentError::ZeroAmount` when `amount_atomic == 0`.
    pub fn create_request(
        &self,
        owner: Did,
        amount_atomic: u64,
        method: PaymentMethod,
        currency: Option<String>,
        description: Option<String>,
        expires_in_secs: Option<u64>,
    ) -> Result<PaymentRequest, PaymentError> {
        if amount_atomic == 0 {
            return Err(PaymentError::ZeroAmount);
        }
        let now = self.clock.now_ms();
        let lifetime = expires_in_secs.unwrap_or(Self::DEFAULT_EXPIRY_SECS);
        let request = PaymentRequest {
            id: Uuid::new_v4(),
            owner,
            amount_atomic,
            currency: currency.unwrap_or_else(|| "CRD".to_string()),
            method,
            status: PaymentStatus::Created,
            description,
            provider_ref: None,
            metadata: serde_json::Value::Null,
            expires_at: Some(now + lifetime * 1_000),
            created_at: now,
            updated_at: now,
        };
        self.requests.insert(request.id, request.clone());
        info!(request_id = %request.id, owner = %request.owner, amount = amount_atomic, "Payment request created");
        Ok(request)
    }

    /// Look up a request.
    pub fn get(&self, id: Uuid) -> Result<PaymentRequest, PaymentError> {
        self.requests
            .get(&id)
            .map(|r| r.clone())
            .ok_or(PaymentError::NotFound(id))
    }

    /// Settle a request from a verified provider webhook. Deposits into the
    /// owner's account and appends the receipt; idempotent on `tx_ref`.
    pub fn confirm(
        &self,
        request_id: Uuid,
        provider: &str,
        tx_ref: &str,
        raw: serde_json::Value,
    ) -> Result<PaymentReceipt, PaymentError> {
        if self.settled_tx_refs.contains_key(tx_ref) {
            return Err(PaymentError::AlreadySettled(tx_ref.to_string()));
        }
        let now = self.clock.now_ms();
        let (owner, amount) = {
            let mut request = self
                .requests
                .get_mut(&request_id)
                .ok_or(PaymentError::NotFound(request_id))?;
            if !request.status.is_open() {
                return Err(PaymentError::NotOpen {
                    id: request_id,
                    status: request.status,
                });
            }
            if request.expires_at.is_some_and(|at| at < now) {
                request.status = PaymentStatus::Expired;
                request.updated_at = now;
                return Err(PaymentError::NotOpen {
                    id: request_id,
                    status: PaymentStatus::Expired,
                });
            }
            request.status = PaymentStatus::Paid;
            request.provider_ref = Some(tx_ref.to_string());
            request.updated_at = now;
            (request.owner.clone(), request.amount_atomic)
        };

        // webhooks may land before the agent ever touched the ledger
        self.ledger.ensure_account(&owner, 0);
        self.ledger.deposit(
            &owner,
            amount,
            serde_json::json!({"payment_request": request_id.to_string(), "provider": provider}),
        )?;

        let receipt = PaymentReceipt {
            request_id,
            provider: provider.to_string(),
            tx_ref: tx_ref.to_string(),
            amount_atomic: amount,
            confirmed_at: now,
            raw,
        };
        self.settled_tx_refs.insert(tx_ref.to_string(), request_id);
        self.receipts.lock().push(receipt.clone());
        info!(request_id = %request_id, provider, amount, "Payment confirmed");
        Ok(receipt)
    }

    /// Cancel an open request; only the owner may cancel.
    pub fn cancel(&self, id: Uuid, caller: &Did) -> Result<PaymentRequest, PaymentError> {
        let mut request = self
            .requests
            .get_mut(&id)
            .ok_or(PaymentError::NotFound(id))?;
        if &request.owner != caller {
            return Err(PaymentError::NotOwner {
                id,
                caller: caller.clone(),
            });
        }
        if !request.status.is_open() {
            return Err(PaymentError::NotOpen {
                id,
                status: request.status,
            });
        }
        request.status = PaymentStatus::Cancelled;
        request.updated_at = self.clock.now_ms();
        Ok(request.clone())
    }

    /// Mark overdue open requests as expired.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut expired = 0;
        for mut entry in self.requests.iter_mut() {
            if entry.status.is_open() && entry.expires_at.is_some_and(|at| at < now) {
                entry.status = PaymentStatus::Expired;
                entry.updated_at = now;
                expired += 1;
            }
        }
        if expired > 0 {
            warn!(expired, "Expired overdue payment requests");
        }
        expired
    }

    /// Receipts recorded so far (test/audit hook).
    #[must_use]
    pub fn receipts(&self) -> Vec<PaymentReceipt> {
        self.receipts.lock().clone()
    }
}
