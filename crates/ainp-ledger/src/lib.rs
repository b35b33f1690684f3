//! # Credit Ledger
//!
//! Off-chain double-entry-style accounting for agent credits.
//!
//! ## Invariants (after every commit)
//!
//! | Invariant | Enforcement |
//! |-----------|-------------|
//! | `balance >= reserved` | checked before any reserve/spend mutation |
//! | `balance, reserved, earned, spent >= 0` | unsigned arithmetic + preconditions |
//! | transactions reconstruct derived fields | every op appends exactly one row set inside its critical section |
//! | idempotency by `(agent, type, intent_ref)` | uniqueness check in the same critical section |
//!
//! ## Concurrency
//!
//! Every mutation locks the single account row it touches; operations on
//! one agent are linearizable, operations across agents never contend.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod ledger;
pub mod payments;

pub use domain::{CreditAccount, CreditTransaction, LedgerError, TxType};
pub use ledger::CreditLedger;
pub use payments::{
    PaymentError, PaymentMethod, PaymentReceipt, PaymentRequest, PaymentService, PaymentStatus,
};
