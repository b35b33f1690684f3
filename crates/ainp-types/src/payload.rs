//! # Typed Envelope Payloads
//!
//! The closed payload sum carried by [`crate::Envelope`]. Each wire message
//! type maps to a known payload shape; the discriminator is the `kind`
//! field and unknown discriminators fail deserialization at the ingress.

use crate::did::Did;
use serde::{Deserialize, Serialize};

/// Routing hints shared by the mail-producing payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSemantics {
    /// Thread the message belongs to. A fresh conversation id is assigned
    /// at delivery when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    /// Envelope id this message replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

/// Generic agent-to-agent intent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    #[serde(default = "default_mime")]
    pub mime_type: String,
    #[serde(default)]
    pub semantics: MessageSemantics,
    /// Capability query for recipient-less intents; routing fans the
    /// message out to the matched agents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryQuery>,
}

/// Email-facet message: always carries a subject and may CC further agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailBody {
    pub subject: String,
    pub body: String,
    #[serde(default = "default_mime")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Did>,
    #[serde(default)]
    pub semantics: MessageSemantics,
}

/// Short-form chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBody {
    pub body: String,
    #[serde(default)]
    pub semantics: MessageSemantics,
}

/// Control-plane notification (negotiation transitions, finalized receipts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationBody {
    /// Machine-readable event name, e.g. `negotiation.accepted`.
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Result of previously routed work, travelling back to the requester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBody {
    /// Envelope id of the intent this result answers.
    pub intent_id: String,
    pub status: String,
    #[serde(default)]
    pub output: serde_json::Value,
}

/// One negotiation round carried over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiateBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Proposal terms; numeric terms participate in convergence scoring.
    pub proposal: serde_json::Value,
}

/// A single advertised capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    /// Natural-language description; embedded for semantic lookup.
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_ref: Option<String>,
    /// Advertised typical latency, used by discovery post-filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Advertised cost per invocation, used by discovery post-filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// Capability advertisement (registration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertiseBody {
    pub capabilities: Vec<CapabilitySpec>,
    /// Optional initial trust aggregate in [0,1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_seed: Option<f64>,
    /// Registration TTL; the agent soft-expires after this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

/// Discovery query, by semantic description and/or post-filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_trust: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Discovery envelope payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverBody {
    pub query: DiscoveryQuery,
}

/// One ranked discovery hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryMatch {
    pub did: Did,
    /// Closest matching capability description for this agent.
    pub description: String,
    /// Cosine similarity in [0,1] (1 = identical direction).
    pub similarity: f64,
    pub trust: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usefulness: Option<f64>,
    /// Blended ranking score.
    pub score: f64,
}

/// Ranked matches published back to the requester's results subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverResultBody {
    pub matches: Vec<DiscoveryMatch>,
}

/// The closed payload sum. The `kind` discriminator is part of the wire
/// contract; shapes not listed here are rejected on ingress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Payload {
    Message(MessageBody),
    EmailMessage(EmailBody),
    ChatMessage(ChatBody),
    Notification(NotificationBody),
    Result(ResultBody),
    Negotiate(NegotiateBody),
    Advertise(AdvertiseBody),
    Discover(DiscoverBody),
    DiscoverResult(DiscoverResultBody),
}

impl Payload {
    /// Whether delivery of this payload persists a mailbox row.
    #[must_use]
    pub fn is_mail_producing(&self) -> bool {
        matches!(
            self,
            Payload::Message(_) | Payload::EmailMessage(_) | Payload::ChatMessage(_)
        )
    }

    /// Conversation id hint for threading, when the payload carries one.
    #[must_use]
    pub fn conversation_hint(&self) -> Option<&str> {
        let semantics = match self {
            Payload::Message(m) => &m.semantics,
            Payload::EmailMessage(m) => &m.semantics,
            Payload::ChatMessage(m) => &m.semantics,
            _ => return None,
        };
        semantics.conversation_id.as_deref()
    }

    /// Subject line, when the payload carries one.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        match self {
            Payload::Message(m) => m.subject.as_deref(),
            Payload::EmailMessage(m) => Some(&m.subject),
            _ => None,
        }
    }

    /// Message body text for the mail-producing payloads.
    #[must_use]
    pub fn body_text(&self) -> Option<&str> {
        match self {
            Payload::Message(m) => Some(&m.body),
            Payload::EmailMessage(m) => Some(&m.body),
            Payload::ChatMessage(m) => Some(&m.body),
            _ => None,
        }
    }

    /// MIME type for the mail-producing payloads.
    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        match self {
            Payload::Message(m) => Some(&m.mime_type),
            Payload::EmailMessage(m) => Some(&m.mime_type),
            Payload::ChatMessage(_) => Some("text/plain"),
            _ => None,
        }
    }
}

fn default_mime() -> String {
    "text/plain".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}
