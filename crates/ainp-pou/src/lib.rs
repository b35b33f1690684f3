//! # Proof-of-Usefulness Pipeline
//!
//! Task receipts, committee attestation, quorum finalization, usefulness
//! scoring, and rolling reputation.
//!
//! ## Flow
//!
//! ```text
//! settle ──▶ receipt (pending, committee selected from seed)
//!                 │  attestations (client ACCEPTED, committee AUDIT_PASS /
//!                 │                SAFETY_PASS / REJECT)
//!                 ▼
//!          finalizer worker ── quorum met ──▶ finalized ──▶ reputation EWMA
//!                 └────────── contradictions ──▶ disputed
//! ```
//!
//! ## Quorum
//!
//! A receipt finalizes when distinct committee `AUDIT_PASS` attestations
//! reach `k` (scaled down proportionally when fewer than `m` eligible
//! agents existed at selection time). The client's `ACCEPTED` is recorded
//! as supporting signal but cannot finalize on its own.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod committee;
pub mod domain;
pub mod jobs;
pub mod ports;
pub mod scoring;
pub mod service;
pub mod usefulness;

pub use committee::{scaled_quorum, select_committee};
pub use domain::{
    Attestation, AttestationType, PouError, ReceiptStatus, ReputationVector, TaskReceipt,
    UsefulnessProof, WorkType,
};
pub use jobs::{run_aggregator, run_finalizer};
pub use ports::{
    CommitteeRoster, NullReceiptNotifier, NullSink, ReceiptNotifier, StaticRoster, UsefulnessSink,
};
pub use scoring::{score_proof, validate_proof};
pub use service::{NewReceipt, ReceiptService};
pub use usefulness::UsefulnessService;
