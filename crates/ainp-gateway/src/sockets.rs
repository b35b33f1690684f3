//! # Socket Registry
//!
//! Long-lived per-agent connections. Each connection owns an outbound
//! queue; pushing never blocks the routing pipeline (a full queue drops
//! the frame and the agent recovers from the durable stream).

use ainp_routing::SocketPush;
use ainp_types::{Did, Envelope};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Outbound frames buffered per connection.
pub const SEND_QUEUE_CAPACITY: usize = 256;

/// Registry of connected agent sockets.
#[derive(Default)]
pub struct SocketRegistry {
    connections: DashMap<Did, mpsc::Sender<Envelope>>,
}

impl SocketRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh connection, returning its outbound queue. An
    /// existing connection for the DID is replaced (latest socket wins).
    #[must_use]
    pub fn connect(&self, did: &Did) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        self.connections.insert(did.clone(), tx);
        info!(agent = %did, "Socket connected");
        rx
    }

    /// Drop a connection if it is still the registered one.
    pub fn disconnect(&self, did: &Did) {
        self.connections.remove_if(did, |_, sender| sender.is_closed());
        debug!(agent = %did, "Socket disconnected");
    }

    /// Whether the agent has an open socket.
    #[must_use]
    pub fn is_connected(&self, did: &Did) -> bool {
        self.connections
            .get(did)
            .is_some_and(|sender| !sender.is_closed())
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[async_trait]
impl SocketPush for SocketRegistry {
    async fn push(&self, recipient: &Did, envelope: &Envelope) -> bool {
        let Some(sender) = self.connections.get(recipient).map(|s| s.clone()) else {
            return false;
        };
        // full or closed queue: the durable stream covers redelivery
        sender.try_send(envelope.clone()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ainp_types::{ChatBody, MessageSemantics, MsgType, Payload};

    fn did(s: &str) -> Did {
        Did::parse(format!("did:key:z{s}")).unwrap()
    }

    fn envelope() -> Envelope {
        Envelope::new(
            did("A"),
            Some(did("B")),
            MsgType::Intent,
            Payload::ChatMessage(ChatBody {
                body: "hi".into(),
                semantics: MessageSemantics::default(),
            }),
            1,
        )
    }

    #[tokio::test]
    async fn test_push_to_connected() {
        let registry = SocketRegistry::new();
        let mut rx = registry.connect(&did("B"));
        assert!(registry.push(&did("B"), &envelope()).await);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_push_to_absent_is_false() {
        let registry = SocketRegistry::new();
        assert!(!registry.push(&did("Nobody"), &envelope()).await);
    }

    #[tokio::test]
    async fn test_latest_socket_wins() {
        let registry = SocketRegistry::new();
        let _old = registry.connect(&did("B"));
        let mut new = registry.connect(&did("B"));
        assert_eq!(registry.connection_count(), 1);
        registry.push(&did("B"), &envelope()).await;
        assert!(new.recv().await.is_some());
    }
}
