//! # AINP Broker Test Suite
//!
//! Unified test crate for cross-subsystem flows: the envelope pipeline end
//! to end, negotiation with settlement, discovery ranking, committee
//! quorum, postage challenges, and ledger invariants.
//!
//! ## Running Tests
//!
//! ```bash
//! # All integration flows
//! cargo test -p ainp-tests
//!
//! # By area
//! cargo test -p ainp-tests integration::envelope_pipeline
//! cargo test -p ainp-tests integration::negotiation_flow
//! ```

#![allow(dead_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod helpers;
pub mod integration;
