//! # API Gateway
//!
//! The broker's external interface surface: envelope ingress, discovery,
//! mailbox reads, negotiation control, receipts, usefulness, payments,
//! health, and the WebSocket gateway.
//!
//! ## Contract highlights
//!
//! | Concern | Behavior |
//! |---------|----------|
//! | identity | `x-ainp-did` header set by the auth middleware in front |
//! | `402` | `WWW-Authenticate: AINP-Pay ...` plus `Link: <...>; rel="payment"` |
//! | `425` / `429` | `Retry-After` in seconds |
//! | sockets | `/ws?did=...`; missing DID closes with 1008; resume from durable cursors |
//! | health | `/health` per-component, `/health/ready` readiness gate |

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod auth;
pub mod error;
pub mod router;
pub mod service;
pub mod sockets;
pub mod state;
pub mod ws;

pub use auth::{CallerDid, DID_HEADER};
pub use error::ApiError;
pub use router::build_router;
pub use service::serve;
pub use sockets::SocketRegistry;
pub use state::AppState;
