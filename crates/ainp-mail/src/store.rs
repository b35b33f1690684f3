//! # Mail Store
//!
//! One write guard covers a message insert and its thread/contact roll-up,
//! which is what keeps the aggregate invariants observable at all times.
//! Reads clone snapshots out of the guard.

use crate::domain::{
    ConsentState, Contact, ContactStanding, MailError, MessageRow, Thread,
};
use ainp_crypto::sha256_hex;
use ainp_types::{Clock, Did, Envelope, Payload};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Inbox query parameters.
#[derive(Debug, Clone, Default)]
pub struct InboxQuery {
    pub limit: usize,
    /// Opaque cursor from a previous page.
    pub cursor: Option<String>,
    /// Only messages carrying this label.
    pub label: Option<String>,
    /// Only unread messages.
    pub unread_only: bool,
}

/// One inbox page, newest first.
#[derive(Debug, Clone)]
pub struct InboxPage {
    pub messages: Vec<MessageRow>,
    /// Present when more rows exist past this page.
    pub next_cursor: Option<String>,
}

#[derive(Default)]
struct Inner {
    /// envelope_id -> row.
    messages: HashMap<String, MessageRow>,
    /// conversation_id -> aggregate.
    threads: HashMap<String, Thread>,
    /// (owner, peer) -> contact.
    contacts: HashMap<(Did, Did), Contact>,
}

/// The mailbox store.
pub struct MailStore {
    clock: Arc<dyn Clock>,
    inner: RwLock<Inner>,
}

impl MailStore {
    /// Default inbox page size.
    pub const DEFAULT_PAGE_SIZE: usize = 50;

    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Persist a delivered envelope as mail. Thread aggregates and contact
    /// rows are updated in the same critical section.
    ///
    /// # Errors
    ///
    /// - `MailError::NotMailPayload` for non-mail payloads
    /// - `MailError::DuplicateEnvelope` when the envelope id is known
    pub fn insert_message(&self, envelope: &Envelope) -> Result<MessageRow, MailError> {
        if !envelope.payload.is_mail_producing() {
            return Err(MailError::NotMailPayload);
        }
        let body = envelope
            .payload
            .body_text()
            .ok_or(MailError::NotMailPayload)?;

        let now = self.clock.now_ms();
        let mut recipients: Vec<Did> = Vec::new();
        if let Some(to) = &envelope.to_did {
            recipients.push(to.clone());
        }
        if let Payload::EmailMessage(email) = &envelope.payload {
            for cc in &email.cc {
                if !recipients.contains(cc) {
                    recipients.push(cc.clone());
                }
            }
        }
        let conversation_id = envelope
            .payload
            .conversation_hint()
            .map(str::to_string)
            .unwrap_or_else(|| envelope.trace_id.clone());

        let row = MessageRow {
            envelope_id: envelope.id.clone(),
            conversation_id: conversation_id.clone(),
            sender: envelope.from_did.clone(),
            recipients: recipients.clone(),
            subject: envelope.payload.subject().map(str::to_string),
            body: body.to_string(),
            mime_type: envelope
                .payload
                .mime_type()
                .unwrap_or("text/plain")
                .to_string(),
            body_hash: sha256_hex(body.as_bytes()),
            labels: Vec::new(),
            received_at: now,
            read_at: None,
        };

        let mut inner = self.inner.write();
        if inner.messages.contains_key(&envelope.id) {
            return Err(MailError::DuplicateEnvelope(envelope.id.clone()));
        }

        // thread roll-up
        let thread = inner
            .threads
            .entry(conversation_id.clone())
            .or_insert_with(|| Thread {
                conversation_id: conversation_id.clone(),
                participants: BTreeSet::new(),
                message_count: 0,
                unread_count: 0,
                first_message_at: now,
                last_message_at: now,
                labels: Vec::new(),
                archived: false,
                muted: false,
            });
        thread.participants.insert(row.sender.clone());
        thread.participants.extend(recipients.iter().cloned());
        thread.message_count += 1;
        thread.unread_count += 1;
        thread.last_message_at = now;

        // contact roll-up, both directions
        for recipient in &recipients {
            for (owner, peer) in [
                (recipient, &envelope.from_did),
                (&envelope.from_did, recipient),
            ] {
                let contact = Self::upsert_contact(&mut inner.contacts, owner, peer, now);
                contact.last_seen_at = now;
                contact.message_count += 1;
            }
        }

        inner.messages.insert(envelope.id.clone(), row.clone());
        debug!(envelope_id = %row.envelope_id, conversation = %conversation_id, "Mail persisted");
        Ok(row)
    }

    /// Page through an agent's inbox, newest first.
    #[must_use]
    pub fn inbox(&self, owner: &Did, query: &InboxQuery) -> InboxPage {
        let inner = self.inner.read();
        let mut rows: Vec<&MessageRow> = inner
            .messages
            .values()
            .filter(|row| row.recipients.contains(owner))
            .filter(|row| {
                query
                    .label
                    .as_ref()
                    .map_or(true, |label| row.labels.contains(label))
            })
            .filter(|row| !query.unread_only || row.is_unread())
            .collect();
        rows.sort_by(|a, b| {
            b.received_at
                .cmp(&a.received_at)
                .then_with(|| b.envelope_id.cmp(&a.envelope_id))
        });

        // cursor = "<received_at>:<envelope_id>" of the last row served
        if let Some((cursor_at, cursor_id)) = query.cursor.as_deref().and_then(parse_cursor) {
            rows.retain(|row| {
                row.received_at < cursor_at
                    || (row.received_at == cursor_at && row.envelope_id.as_str() < cursor_id)
            });
        }

        let limit = if query.limit == 0 {
            Self::DEFAULT_PAGE_SIZE
        } else {
            query.limit
        };
        let has_more = rows.len() > limit;
        let messages: Vec<MessageRow> = rows.into_iter().take(limit).cloned().collect();
        let next_cursor = if has_more {
            messages
                .last()
                .map(|row| format!("{}:{}", row.received_at, row.envelope_id))
        } else {
            None
        };
        InboxPage {
            messages,
            next_cursor,
        }
    }

    /// A thread and its messages, oldest first.
    pub fn thread(&self, conversation_id: &str) -> Result<(Thread, Vec<MessageRow>), MailError> {
        let inner = self.inner.read();
        let thread = inner
            .threads
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| MailError::ThreadNotFound(conversation_id.to_string()))?;
        let mut messages: Vec<MessageRow> = inner
            .messages
            .values()
            .filter(|row| row.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.envelope_id.cmp(&b.envelope_id))
        });
        Ok((thread, messages))
    }

    /// Single message row.
    pub fn message(&self, envelope_id: &str) -> Result<MessageRow, MailError> {
        self.inner
            .read()
            .messages
            .get(envelope_id)
            .cloned()
            .ok_or_else(|| MailError::MessageNotFound(envelope_id.to_string()))
    }

    /// Transition read state. Forward-only: marking an already-read message
    /// read again (or unread) is a no-op.
    pub fn mark_read(&self, caller: &Did, envelope_id: &str) -> Result<MessageRow, MailError> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.write();
        let row = inner
            .messages
            .get_mut(envelope_id)
            .ok_or_else(|| MailError::MessageNotFound(envelope_id.to_string()))?;
        if !row.involves(caller) {
            return Err(MailError::NotAParticipant(caller.clone()));
        }
        if row.read_at.is_none() {
            row.read_at = Some(now);
            let conversation_id = row.conversation_id.clone();
            let snapshot = row.clone();
            if let Some(thread) = inner.threads.get_mut(&conversation_id) {
                thread.unread_count = thread.unread_count.saturating_sub(1);
            }
            return Ok(snapshot);
        }
        Ok(row.clone())
    }

    /// Add and remove labels on a message; the thread's label set follows.
    pub fn label(
        &self,
        caller: &Did,
        envelope_id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<MessageRow, MailError> {
        let mut inner = self.inner.write();
        let row = inner
            .messages
            .get_mut(envelope_id)
            .ok_or_else(|| MailError::MessageNotFound(envelope_id.to_string()))?;
        if !row.involves(caller) {
            return Err(MailError::NotAParticipant(caller.clone()));
        }
        for label in add {
            if !row.labels.contains(label) {
                row.labels.push(label.clone());
            }
        }
        row.labels.retain(|l| !remove.contains(l));
        let snapshot = row.clone();
        let conversation_id = snapshot.conversation_id.clone();

        // recompute the thread's label union
        let union: Vec<String> = {
            let mut labels: Vec<String> = inner
                .messages
                .values()
                .filter(|m| m.conversation_id == conversation_id)
                .flat_map(|m| m.labels.iter().cloned())
                .collect();
            labels.sort();
            labels.dedup();
            labels
        };
        if let Some(thread) = inner.threads.get_mut(&conversation_id) {
            thread.labels = union;
        }
        Ok(snapshot)
    }

    /// Explicit consent mutation; creates the contact row when absent.
    pub fn set_consent(
        &self,
        owner: &Did,
        peer: &Did,
        consent: ConsentState,
        alias: Option<String>,
        allowlisted: Option<bool>,
    ) -> Contact {
        let now = self.clock.now_ms();
        let mut inner = self.inner.write();
        let contact = Self::upsert_contact(&mut inner.contacts, owner, peer, now);
        contact.consent = consent;
        if let Some(alias) = alias {
            contact.alias = Some(alias);
        }
        if let Some(allowlisted) = allowlisted {
            contact.allowlisted = allowlisted;
        }
        contact.clone()
    }

    /// A contact row, when present.
    #[must_use]
    pub fn contact(&self, owner: &Did, peer: &Did) -> Option<Contact> {
        self.inner
            .read()
            .contacts
            .get(&(owner.clone(), peer.clone()))
            .cloned()
    }

    /// Contact standing for the guard and routing.
    #[must_use]
    pub fn standing(&self, sender: &Did, recipient: &Did) -> ContactStanding {
        let inner = self.inner.read();
        let incoming = inner.contacts.get(&(recipient.clone(), sender.clone()));
        let outgoing = inner.contacts.get(&(sender.clone(), recipient.clone()));
        let blocked = incoming.is_some_and(|c| c.consent == ConsentState::Blocked);
        let mutual = !blocked
            && incoming.is_some_and(|c| c.consent.accepts_mail())
            && outgoing.is_some_and(|c| c.consent.accepts_mail());
        let allowlisted = incoming
            .is_some_and(|c| c.allowlisted || c.consent == ConsentState::Trusted);
        ContactStanding {
            mutual,
            allowlisted,
            blocked,
        }
    }

    /// Total message rows (test/audit hook).
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.inner.read().messages.len()
    }

    fn upsert_contact<'a>(
        contacts: &'a mut HashMap<(Did, Did), Contact>,
        owner: &Did,
        peer: &Did,
        now: u64,
    ) -> &'a mut Contact {
        contacts
            .entry((owner.clone(), peer.clone()))
            .or_insert_with(|| Contact {
                owner: owner.clone(),
                peer: peer.clone(),
                alias: None,
                consent: ConsentState::Unknown,
                allowlisted: false,
                trust_override: None,
                first_seen_at: now,
                last_seen_at: now,
                message_count: 0,
            })
    }
}

fn parse_cursor(cursor: &str) -> Option<(u64, &str)> {
    let (at, id) = cursor.split_once(':')?;
    Some((at.parse().ok()?, id))
}
