//! # Routing Service
//!
//! Orchestrates one envelope through the full pipeline. Side effects
//! already committed are not rolled back on later failure; the guard's
//! replay cache and the mail store's envelope-id uniqueness make retries
//! safe.

use crate::errors::RouteError;
use crate::ports::SocketPush;
use ainp_bus::{Category, StreamError, StreamPublisher, Subject};
use ainp_crypto::{verify_envelope, TEST_SIGNATURE_SENTINEL};
use ainp_discovery::DiscoveryService;
use ainp_guard::{EnvelopeGuard, GuardContext};
use ainp_mail::{MailError, MailStore};
use ainp_types::{
    BrokerConfig, Clock, Did, DiscoverResultBody, DiscoveryQuery, Envelope, MsgType, Payload,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// System identity stamped on broker-originated envelopes.
pub const BROKER_DID: &str = "did:ainp:broker";

/// Pause before the single stream-publish retry.
const PUBLISH_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Successful routing result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOutcome {
    /// Number of agents the envelope was delivered to.
    pub agent_count: usize,
    /// A best-effort dependency was bypassed on the way.
    pub degraded: bool,
}

/// The routing and delivery service.
pub struct RoutingService {
    clock: Arc<dyn Clock>,
    config: BrokerConfig,
    guard: Arc<EnvelopeGuard>,
    discovery: Arc<DiscoveryService>,
    mail: Arc<MailStore>,
    stream: Arc<dyn StreamPublisher>,
    sockets: Arc<dyn SocketPush>,
}

impl RoutingService {
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        config: BrokerConfig,
        guard: Arc<EnvelopeGuard>,
        discovery: Arc<DiscoveryService>,
        mail: Arc<MailStore>,
        stream: Arc<dyn StreamPublisher>,
        sockets: Arc<dyn SocketPush>,
    ) -> Self {
        Self {
            clock,
            config,
            guard,
            discovery,
            mail,
            stream,
            sockets,
        }
    }

    /// Run the full pipeline on a verified-or-verifiable envelope.
    pub async fn deliver(&self, envelope: &Envelope) -> Result<RouteOutcome, RouteError> {
        if envelope.version != Envelope::CURRENT_VERSION {
            return Err(RouteError::UnsupportedVersion(envelope.version));
        }
        self.verify(envelope)?;

        // contact standing feeds the guard and the block check
        let standing = envelope
            .to_did
            .as_ref()
            .map(|recipient| self.mail.standing(&envelope.from_did, recipient))
            .unwrap_or_default();
        if standing.blocked {
            return Err(RouteError::RecipientBlocked);
        }

        let verdict = self
            .guard
            .check(
                envelope,
                GuardContext {
                    mutual_contacts: standing.mutual,
                    allowlisted: standing.allowlisted,
                },
            )
            .await?;

        self.discovery.touch(&envelope.from_did);

        let outcome = match (&envelope.to_did, &envelope.payload) {
            (Some(recipient), _) => {
                let recipient = recipient.clone();
                self.deliver_to(envelope, &[recipient]).await?
            }
            (None, Payload::Discover(body)) => self.answer_discovery(envelope, &body.query).await?,
            (None, Payload::Message(message)) => match &message.discovery {
                Some(query) => {
                    let matches = self.discovery.search(query).await;
                    let targets: Vec<Did> =
                        matches.matches.into_iter().map(|m| m.did).collect();
                    if targets.is_empty() {
                        0
                    } else {
                        self.deliver_to(envelope, &targets).await?
                    }
                }
                None => return Err(RouteError::Unroutable),
            },
            _ => return Err(RouteError::Unroutable),
        };

        info!(
            envelope = %envelope.id,
            sender = %envelope.from_did,
            agent_count = outcome,
            "Envelope routed"
        );
        Ok(RouteOutcome {
            agent_count: outcome,
            degraded: verdict.degraded,
        })
    }

    fn verify(&self, envelope: &Envelope) -> Result<(), RouteError> {
        if self.config.signature.enabled {
            verify_envelope(envelope)?;
            return Ok(());
        }
        // bypass profile: the sentinel (or any present signature) passes
        if self.config.signature.allow_test_sentinel
            && envelope.signature.as_deref() == Some(TEST_SIGNATURE_SENTINEL)
        {
            return Ok(());
        }
        if envelope.signature.is_some() {
            return Ok(());
        }
        Err(RouteError::Signature(
            ainp_crypto::CryptoError::SignatureMissing,
        ))
    }

    async fn deliver_to(
        &self,
        envelope: &Envelope,
        targets: &[Did],
    ) -> Result<usize, RouteError> {
        let category = category_for(envelope.msg_type);
        for target in targets {
            let subject = Subject::for_agent(category, target);
            self.publish_with_retry(&subject, envelope.clone()).await?;

            if envelope.payload.is_mail_producing() {
                match self.mail.insert_message(envelope) {
                    Ok(_) => {}
                    // replay-protected path; a duplicate here means a
                    // concurrent retry already persisted it
                    Err(MailError::DuplicateEnvelope(_)) => {
                        debug!(envelope = %envelope.id, "Mail row already present");
                    }
                    Err(err) => return Err(RouteError::Internal(err.to_string())),
                }
            }

            let pushed = self.sockets.push(target, envelope).await;
            debug!(target = %target, pushed, subject = %subject, "Delivery attempted");
        }
        Ok(targets.len())
    }

    /// DISCOVER flow: run the search and publish a `DISCOVER_RESULT`
    /// envelope to the requester's own subject.
    async fn answer_discovery(
        &self,
        envelope: &Envelope,
        query: &DiscoveryQuery,
    ) -> Result<usize, RouteError> {
        let outcome = self.discovery.search(query).await;
        let count = outcome.matches.len();

        let broker = Did::parse(BROKER_DID)
            .unwrap_or_else(|_| unreachable!("broker identity is well-formed"));
        let result = Envelope {
            trace_id: envelope.trace_id.clone(),
            ..Envelope::new(
                broker,
                Some(envelope.from_did.clone()),
                MsgType::DiscoverResult,
                Payload::DiscoverResult(DiscoverResultBody {
                    matches: outcome.matches,
                }),
                self.clock.now_ms(),
            )
        };
        let subject = Subject::for_agent(Category::DiscoverResults, &envelope.from_did);
        self.publish_with_retry(&subject, result.clone()).await?;
        self.sockets.push(&envelope.from_did, &result).await;
        Ok(count)
    }

    async fn publish_with_retry(
        &self,
        subject: &Subject,
        envelope: Envelope,
    ) -> Result<u64, RouteError> {
        match self.stream.publish(subject, envelope.clone()).await {
            Ok(offset) => Ok(offset),
            Err(StreamError::Unavailable) => {
                warn!(subject = %subject, "Stream publish failed, retrying once");
                tokio::time::sleep(PUBLISH_RETRY_DELAY).await;
                self.stream
                    .publish(subject, envelope)
                    .await
                    .map_err(|_| RouteError::UpstreamDown)
            }
        }
    }
}

fn category_for(msg_type: MsgType) -> Category {
    match msg_type {
        MsgType::Intent | MsgType::Advertise | MsgType::Discover => Category::Intents,
        MsgType::Result | MsgType::Notification => Category::Results,
        MsgType::Negotiate => Category::Negotiations,
        MsgType::DiscoverResult => Category::DiscoverResults,
    }
}
