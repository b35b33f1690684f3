//! # Mail Store
//!
//! Thread-structured mailbox persistence.
//!
//! ## Aggregate Invariants
//!
//! | Invariant | Enforcement |
//! |-----------|-------------|
//! | `envelope_id` unique per message row | uniqueness check in the insert critical section |
//! | `thread.message_count` = messages in conversation | roll-up in the same critical section as insert |
//! | `thread.unread_count` = messages with no `read_at` | roll-up on insert and on read transitions |
//! | `thread.participants ⊇ sender ∪ recipients` | union maintained on insert |
//! | `body_hash` = SHA-256 of the body | computed at insert, never updated |
//! | read state transitions forward only | `read_at` is write-once |
//!
//! Contact rows are auto-created on message exchange in both directions and
//! mutated only by the explicit consent APIs.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod store;

pub use domain::{ConsentState, Contact, ContactStanding, MailError, MessageRow, Thread};
pub use store::{InboxPage, InboxQuery, MailStore};
