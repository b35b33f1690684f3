//! # Postage Port
//!
//! The guard charges postage through this seam; the composition root backs
//! it with the credit ledger. Keeping the ledger behind a trait keeps the
//! guard free of accounting concerns and testable without funds.

use ainp_types::Did;
use async_trait::async_trait;
use thiserror::Error;

/// Postage debit failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PostageError {
    /// The sender cannot cover the stamp.
    #[error("insufficient balance: required {required}, available {available}")]
    Insufficient { required: u64, available: u64 },

    /// The ledger is unreachable or disabled.
    #[error("postage backend unavailable")]
    Unavailable,
}

/// Charges a postage stamp against the sender's account.
#[async_trait]
pub trait PostageCharger: Send + Sync {
    /// Debit `amount` atomic units from `sender` for `envelope_id`.
    async fn charge(&self, sender: &Did, amount: u64, envelope_id: &str)
        -> Result<(), PostageError>;
}

/// No-op charger for profiles with postage disabled.
pub struct NoPostage;

#[async_trait]
impl PostageCharger for NoPostage {
    async fn charge(
        &self,
        _sender: &Did,
        _amount: u64,
        _envelope_id: &str,
    ) -> Result<(), PostageError> {
        Ok(())
    }
}
