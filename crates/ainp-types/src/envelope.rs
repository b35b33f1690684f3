//! # Signed Wire Envelope
//!
//! The universal wrapper for all agent traffic entering or leaving the
//! broker.
//!
//! ## Properties
//!
//! - **Versioning**: every envelope carries a `version` for forward
//!   compatibility.
//! - **Tracing**: `trace_id` correlates an intent with its results and
//!   any negotiation rounds it spawns.
//! - **Time-bounded validity**: `timestamp + ttl` is the hard deadline;
//!   envelopes outside the window are rejected at the ingress.
//! - **Envelope authority**: `from_did` is the sole source of truth for
//!   sender identity and must verify against the embedded signature.

use crate::did::Did;
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire message types. The type selects the stream category an envelope is
/// delivered on and which payload shapes are legal for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MsgType {
    Intent,
    Result,
    Negotiate,
    Advertise,
    Discover,
    DiscoverResult,
    Notification,
}

impl MsgType {
    /// Wire name, as serialized.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MsgType::Intent => "INTENT",
            MsgType::Result => "RESULT",
            MsgType::Negotiate => "NEGOTIATE",
            MsgType::Advertise => "ADVERTISE",
            MsgType::Discover => "DISCOVER",
            MsgType::DiscoverResult => "DISCOVER_RESULT",
            MsgType::Notification => "NOTIFICATION",
        }
    }
}

/// The signed, addressed message container.
///
/// The signature covers the SHA-256 of the canonical JSON serialization
/// with the `signature` field removed (see the crypto crate). `ttl` and
/// `timestamp` are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u16,
    pub id: String,
    pub trace_id: String,
    pub from_did: Did,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_did: Option<Did>,
    pub msg_type: MsgType,
    /// Time-to-live in milliseconds from `timestamp`.
    pub ttl: u64,
    /// Sender wall-clock at creation, Unix milliseconds.
    pub timestamp: u64,
    pub payload: Payload,
    /// base64(ed25519 signature), absent until signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Envelope {
    /// Current wire protocol version.
    pub const CURRENT_VERSION: u16 = crate::PROTOCOL_VERSION;

    /// Default TTL for envelopes that do not specify one (5 minutes).
    pub const DEFAULT_TTL_MS: u64 = 300_000;

    /// Build an unsigned envelope with fresh ids.
    #[must_use]
    pub fn new(
        from_did: Did,
        to_did: Option<Did>,
        msg_type: MsgType,
        payload: Payload,
        timestamp: u64,
    ) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            id: Uuid::new_v4().to_string(),
            trace_id: Uuid::new_v4().to_string(),
            from_did,
            to_did,
            msg_type,
            ttl: Self::DEFAULT_TTL_MS,
            timestamp,
            payload,
            signature: None,
        }
    }

    /// Absolute expiry instant, Unix milliseconds.
    #[must_use]
    pub fn expires_at_ms(&self) -> u64 {
        self.timestamp.saturating_add(self.ttl)
    }

    /// Whether the envelope deadline has passed. The boundary
    /// `timestamp + ttl == now` is still live.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms() < now_ms
    }

    /// Whether the envelope claims a creation time beyond the allowed skew.
    #[must_use]
    pub fn is_from_future(&self, now_ms: u64, skew_ms: u64) -> bool {
        self.timestamp > now_ms.saturating_add(skew_ms)
    }

    /// Serialize to a JSON value (signature included when present).
    ///
    /// Serialization of an in-memory envelope cannot fail; the payload sum
    /// contains only JSON-representable data.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
