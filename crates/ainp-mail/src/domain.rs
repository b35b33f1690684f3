//! Mail domain entities.

use ainp_types::Did;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Mail store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailError {
    /// A row for this envelope id already exists.
    #[error("duplicate envelope id: {0}")]
    DuplicateEnvelope(String),

    /// No message row for the id.
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// No thread for the conversation id.
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    /// The envelope payload does not produce mail.
    #[error("payload is not a mail-producing type")]
    NotMailPayload,

    /// Caller is not a recipient or sender of the message.
    #[error("agent {0} is not a participant of the message")]
    NotAParticipant(Did),
}

/// A persisted mail message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    /// Envelope id, globally unique.
    pub envelope_id: String,
    pub conversation_id: String,
    pub sender: Did,
    pub recipients: Vec<Did>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    pub mime_type: String,
    /// SHA-256 of the body bytes, lowercase hex.
    pub body_hash: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub received_at: u64,
    /// Write-once; `None` means unread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<u64>,
}

impl MessageRow {
    /// Whether the row is still unread.
    #[must_use]
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }

    /// Whether the agent participated in the exchange.
    #[must_use]
    pub fn involves(&self, agent: &Did) -> bool {
        &self.sender == agent || self.recipients.contains(agent)
    }
}

/// Aggregated conversation state, maintained in the same critical section
/// as message inserts and read transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub conversation_id: String,
    pub participants: BTreeSet<Did>,
    pub message_count: u64,
    pub unread_count: u64,
    pub first_message_at: u64,
    pub last_message_at: u64,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub muted: bool,
}

/// Consent standing of a peer from one owner's perspective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentState {
    #[default]
    Unknown,
    Consented,
    Blocked,
    Trusted,
}

impl ConsentState {
    /// Whether mail from the peer is accepted at all.
    #[must_use]
    pub fn accepts_mail(&self) -> bool {
        !matches!(self, ConsentState::Blocked)
    }
}

/// A directed contact row, primary key (owner, peer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub owner: Did,
    pub peer: Did,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub consent: ConsentState,
    /// Bypasses greylist and postage for the peer.
    pub allowlisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_override: Option<f64>,
    pub first_seen_at: u64,
    pub last_seen_at: u64,
    pub message_count: u64,
}

/// What the guard needs to know about a sender/recipient pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContactStanding {
    /// Both peers have non-blocked contact rows for each other.
    pub mutual: bool,
    /// The recipient allowlisted (or trusts) the sender.
    pub allowlisted: bool,
    /// The recipient blocked the sender; routing refuses delivery.
    pub blocked: bool,
}
