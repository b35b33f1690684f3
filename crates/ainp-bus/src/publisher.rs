//! # Stream Publisher and Durable Consumers
//!
//! In-memory implementation of the durable stream. Retained logs give
//! at-least-once delivery with reconnect-resume; a broadcast live tap feeds
//! connected sockets without waiting on consumer acks.

use crate::subjects::Subject;
use crate::LIVE_CHANNEL_CAPACITY;
use ainp_types::{Clock, Envelope};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Errors from stream operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The broker is unreachable; the write path must surface this after
    /// one retry.
    #[error("stream broker unavailable")]
    Unavailable,
}

/// A message in a retained subject log. Offsets are contiguous per subject
/// starting at 1.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub subject: Subject,
    pub offset: u64,
    /// Broker wall-clock at publish, Unix milliseconds.
    pub published_at: u64,
    pub envelope: Envelope,
}

/// Trait for publishing envelopes to the stream.
#[async_trait]
pub trait StreamPublisher: Send + Sync {
    /// Publish an envelope; returns the assigned offset.
    ///
    /// # Errors
    ///
    /// `StreamError::Unavailable` when the broker is down.
    async fn publish(&self, subject: &Subject, envelope: Envelope) -> Result<u64, StreamError>;
}

struct SubjectLog {
    messages: VecDeque<StreamMessage>,
    next_offset: u64,
}

impl SubjectLog {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            next_offset: 1,
        }
    }
}

/// In-memory durable stream.
///
/// Suitable for single-node operation; a distributed deployment would back
/// the same trait with an external broker. Health can be toggled to
/// exercise the degraded write path.
pub struct InMemoryStreamBus {
    clock: Arc<dyn Clock>,
    logs: RwLock<HashMap<String, SubjectLog>>,
    /// (subject, consumer) -> highest acknowledged offset.
    cursors: RwLock<HashMap<(String, String), u64>>,
    live: broadcast::Sender<StreamMessage>,
    published: AtomicU64,
    available: AtomicBool,
}

impl InMemoryStreamBus {
    /// Create a bus against the given clock.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            clock,
            logs: RwLock::new(HashMap::new()),
            cursors: RwLock::new(HashMap::new()),
            live,
            published: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Live tap over every published message. Slow receivers lag and drop;
    /// durable consumers recover via [`Self::fetch`].
    #[must_use]
    pub fn subscribe_live(&self) -> broadcast::Receiver<StreamMessage> {
        self.live.subscribe()
    }

    /// Messages past the consumer's acknowledged offset, oldest first.
    #[must_use]
    pub fn fetch(&self, subject: &Subject, consumer: &str, max: usize) -> Vec<StreamMessage> {
        let acked = self.acked_offset(subject, consumer);
        let logs = self.logs.read().unwrap_or_else(|e| e.into_inner());
        let Some(log) = logs.get(subject.as_str()) else {
            return Vec::new();
        };
        log.messages
            .iter()
            .filter(|m| m.offset > acked)
            .take(max)
            .cloned()
            .collect()
    }

    /// Acknowledge processing up to `offset` (monotone; lower acks are
    /// ignored).
    pub fn ack(&self, subject: &Subject, consumer: &str, offset: u64) {
        let mut cursors = self.cursors.write().unwrap_or_else(|e| e.into_inner());
        let entry = cursors
            .entry((subject.as_str().to_string(), consumer.to_string()))
            .or_insert(0);
        if offset > *entry {
            *entry = offset;
        }
    }

    /// How many retained messages the consumer has not acknowledged.
    #[must_use]
    pub fn lag(&self, subject: &Subject, consumer: &str) -> u64 {
        let acked = self.acked_offset(subject, consumer);
        let logs = self.logs.read().unwrap_or_else(|e| e.into_inner());
        logs.get(subject.as_str())
            .map(|log| log.messages.iter().filter(|m| m.offset > acked).count() as u64)
            .unwrap_or(0)
    }

    /// Number of retained messages on a subject.
    #[must_use]
    pub fn subject_len(&self, subject: &Subject) -> usize {
        let logs = self.logs.read().unwrap_or_else(|e| e.into_inner());
        logs.get(subject.as_str())
            .map(|log| log.messages.len())
            .unwrap_or(0)
    }

    /// Drop retained messages older than their category retention window.
    /// Unknown-category subjects keep the longest window.
    pub fn sweep_retention(&self) {
        let now = self.clock.now_ms();
        let mut logs = self.logs.write().unwrap_or_else(|e| e.into_inner());
        for (raw, log) in logs.iter_mut() {
            let retention = Subject::from_raw(raw.clone())
                .category()
                .map(|c| c.retention_ms())
                .unwrap_or(30 * 24 * 3_600_000);
            let cutoff = now.saturating_sub(retention);
            let before = log.messages.len();
            log.messages.retain(|m| m.published_at >= cutoff);
            let dropped = before - log.messages.len();
            if dropped > 0 {
                debug!(subject = %raw, dropped, "Retention sweep dropped messages");
            }
        }
    }

    /// Total messages ever published.
    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Whether the broker accepts writes.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Toggle availability (degraded-mode testing and drain on shutdown).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    fn acked_offset(&self, subject: &Subject, consumer: &str) -> u64 {
        let cursors = self.cursors.read().unwrap_or_else(|e| e.into_inner());
        cursors
            .get(&(subject.as_str().to_string(), consumer.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl StreamPublisher for InMemoryStreamBus {
    async fn publish(&self, subject: &Subject, envelope: Envelope) -> Result<u64, StreamError> {
        if !self.is_available() {
            warn!(subject = %subject, "Publish rejected, broker unavailable");
            return Err(StreamError::Unavailable);
        }

        let message = {
            let mut logs = self.logs.write().unwrap_or_else(|e| e.into_inner());
            let log = logs
                .entry(subject.as_str().to_string())
                .or_insert_with(SubjectLog::new);
            let message = StreamMessage {
                subject: subject.clone(),
                offset: log.next_offset,
                published_at: self.clock.now_ms(),
                envelope,
            };
            log.next_offset += 1;
            log.messages.push_back(message.clone());
            message
        };

        self.published.fetch_add(1, Ordering::Relaxed);
        let offset = message.offset;
        // No live receivers is fine; durable consumers still see the log.
        let receivers = self.live.send(message).unwrap_or(0);
        debug!(subject = %subject, offset, receivers, "Message published");
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subjects::Category;
    use ainp_types::{ChatBody, Did, ManualClock, MessageSemantics, MsgType, Payload};

    fn envelope(n: u64) -> Envelope {
        Envelope::new(
            Did::parse("did:key:zAlice").unwrap(),
            Some(Did::parse("did:key:zBob").unwrap()),
            MsgType::Intent,
            Payload::ChatMessage(ChatBody {
                body: format!("msg-{n}"),
                semantics: MessageSemantics::default(),
            }),
            n,
        )
    }

    fn bus_at(ms: u64) -> (Arc<ManualClock>, InMemoryStreamBus) {
        let clock = ManualClock::at(ms);
        let bus = InMemoryStreamBus::new(clock.clone());
        (clock, bus)
    }

    fn subject() -> Subject {
        Subject::for_agent(Category::Intents, &Did::parse("did:key:zBob").unwrap())
    }

    #[tokio::test]
    async fn test_offsets_are_fifo() {
        let (_, bus) = bus_at(1_000);
        let subject = subject();
        for n in 0..5 {
            let offset = bus.publish(&subject, envelope(n)).await.unwrap();
            assert_eq!(offset, n + 1);
        }
        let fetched = bus.fetch(&subject, "bob", 10);
        let offsets: Vec<u64> = fetched.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_ack_advances_cursor() {
        let (_, bus) = bus_at(1_000);
        let subject = subject();
        for n in 0..3 {
            bus.publish(&subject, envelope(n)).await.unwrap();
        }
        bus.ack(&subject, "bob", 2);
        let pending = bus.fetch(&subject, "bob", 10);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].offset, 3);
        assert_eq!(bus.lag(&subject, "bob"), 1);

        // lower ack is ignored
        bus.ack(&subject, "bob", 1);
        assert_eq!(bus.lag(&subject, "bob"), 1);
    }

    #[tokio::test]
    async fn test_redelivery_without_ack() {
        let (_, bus) = bus_at(1_000);
        let subject = subject();
        bus.publish(&subject, envelope(0)).await.unwrap();
        assert_eq!(bus.fetch(&subject, "bob", 10).len(), 1);
        // unacked: a reconnecting consumer sees it again
        assert_eq!(bus.fetch(&subject, "bob", 10).len(), 1);
    }

    #[tokio::test]
    async fn test_consumers_are_independent() {
        let (_, bus) = bus_at(1_000);
        let subject = subject();
        bus.publish(&subject, envelope(0)).await.unwrap();
        bus.ack(&subject, "bob", 1);
        assert_eq!(bus.lag(&subject, "bob"), 0);
        assert_eq!(bus.lag(&subject, "audit"), 1);
    }

    #[tokio::test]
    async fn test_live_tap_receives() {
        let (_, bus) = bus_at(1_000);
        let subject = subject();
        let mut live = bus.subscribe_live();
        bus.publish(&subject, envelope(7)).await.unwrap();
        let message = live.recv().await.unwrap();
        assert_eq!(message.offset, 1);
    }

    #[tokio::test]
    async fn test_unavailable_rejects_writes() {
        let (_, bus) = bus_at(1_000);
        bus.set_available(false);
        let err = bus.publish(&subject(), envelope(0)).await.unwrap_err();
        assert_eq!(err, StreamError::Unavailable);
        bus.set_available(true);
        assert!(bus.publish(&subject(), envelope(0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_retention_sweep() {
        let (clock, bus) = bus_at(1_000);
        let subject = subject();
        bus.publish(&subject, envelope(0)).await.unwrap();
        clock.advance_ms(Category::Intents.retention_ms() + 1_000);
        bus.publish(&subject, envelope(1)).await.unwrap();
        bus.sweep_retention();
        let remaining = bus.fetch(&subject, "bob", 10);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].offset, 2);
    }
}
