//! Outbound ports of the routing service.

use ainp_types::{Did, Envelope};
use async_trait::async_trait;

/// Real-time push to a connected agent socket.
#[async_trait]
pub trait SocketPush: Send + Sync {
    /// Push an envelope frame; returns whether a live connection took it.
    /// `false` is not an error: the agent catches up from the stream.
    async fn push(&self, recipient: &Did, envelope: &Envelope) -> bool;
}

/// Push sink with no connected sockets.
pub struct NoopSockets;

#[async_trait]
impl SocketPush for NoopSockets {
    async fn push(&self, _recipient: &Did, _envelope: &Envelope) -> bool {
        false
    }
}
