//! # Routing & Delivery
//!
//! The envelope pipeline: signature verification, anti-abuse, target
//! resolution, durable stream publish, mail persistence, and socket push.
//!
//! ```text
//! ingress ─▶ verify ─▶ blocked? ─▶ guard ─▶ resolve targets
//!                                             │ direct (to_did)
//!                                             │ discovery-matched
//!                                             ▼
//!                            per target: stream publish ─▶ mail ─▶ socket
//! ```
//!
//! Per-subject ordering comes from the stream; across subjects nothing is
//! guaranteed. Delivery is at-least-once: a disconnected target re-reads
//! from its durable cursor on reconnect.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod errors;
pub mod ports;
pub mod service;

pub use errors::RouteError;
pub use ports::{NoopSockets, SocketPush};
pub use service::{RouteOutcome, RoutingService, BROKER_DID};
