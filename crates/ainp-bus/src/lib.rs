//! # Durable Stream Broker
//!
//! Ordered, retained pub/sub medium for envelope delivery.
//!
//! ## Guarantees
//!
//! - **Per-subject FIFO**: offsets are assigned under the subject's write
//!   guard; consumers observe messages in offset order. Across subjects no
//!   ordering is guaranteed.
//! - **At-least-once**: messages stay in the retained log until the
//!   retention window elapses; a durable consumer that reconnects resumes
//!   from its last acknowledged offset and re-reads anything unacked.
//! - **Consumer lag**: the broker can report how far a durable consumer is
//!   behind the head of its subject.
//!
//! ## Topology
//!
//! ```text
//! publish(subject, envelope)
//!        │
//!        ▼
//!  ┌───────────────┐    live tap     ┌────────────────┐
//!  │ retained log  │ ──────────────▶ │ socket gateway │
//!  │ per subject   │                 └────────────────┘
//!  └───────────────┘
//!        ▲ fetch/ack per durable consumer (reconnect resume)
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod publisher;
pub mod subjects;

pub use publisher::{InMemoryStreamBus, StreamError, StreamMessage, StreamPublisher};
pub use subjects::{Category, Subject};

/// Buffered live-tap events per receiver before lag drops apply.
pub const LIVE_CHANNEL_CAPACITY: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_capacity() {
        assert_eq!(LIVE_CHANNEL_CAPACITY, 1024);
    }
}
