//! # Negotiation Engine
//!
//! Multi-round proposal state machine with convergence tracking, credit
//! reservation on accept, and incentive-split distribution on settle.
//!
//! ## State Machine
//!
//! ```text
//! initiated ── counter ──▶ proposed ── counter ──▶ counter_proposed ─┐
//!                                                        ▲           │ counter
//!                                                        └───────────┘ (until max_rounds)
//! {any non-terminal} ── accept ──▶ accepted
//! {any non-terminal} ── reject ──▶ rejected
//! {any non-terminal} ── expiry  ──▶ expired
//! ```
//!
//! Only the initiator or responder may act, the actor of each round must
//! alternate with the previous round's actor, and acceptance must come
//! from the peer that did **not** make the latest proposal. Terminal
//! states never transition again.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod convergence;
pub mod domain;
pub mod engine;
pub mod ports;

pub use convergence::convergence_between;
pub use domain::{
    Distribution, IncentiveSplit, NegotiationError, Round, Session, SessionState,
};
pub use engine::{NegotiationEngine, SettleOutcome};
pub use ports::{NoopNotifier, NoopReceiptSink, ReceiptContext, ReceiptSink, SessionNotifier};
