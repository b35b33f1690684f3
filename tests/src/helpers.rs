//! Shared fixtures for the integration flows.

use ainp_broker::Broker;
use ainp_crypto::{did_for_public_key, sign_envelope, Ed25519KeyPair};
use ainp_types::{
    BrokerConfig, ChatBody, Did, Envelope, ManualClock, MessageSemantics, MsgType, Payload,
};
use std::sync::Arc;

/// A test agent with its signing key.
pub struct TestAgent {
    pub keypair: Ed25519KeyPair,
    pub did: Did,
}

impl TestAgent {
    /// Deterministic agent from a seed byte.
    #[must_use]
    pub fn from_seed(seed: u8) -> Self {
        let keypair = Ed25519KeyPair::from_seed([seed; 32]);
        let did = did_for_public_key(&keypair.public_key());
        Self { keypair, did }
    }

    /// Build and sign a chat intent to a recipient.
    #[must_use]
    pub fn signed_chat(
        &self,
        to: &Did,
        body: &str,
        conversation_id: Option<&str>,
        timestamp: u64,
    ) -> Envelope {
        let mut envelope = Envelope::new(
            self.did.clone(),
            Some(to.clone()),
            MsgType::Intent,
            Payload::ChatMessage(ChatBody {
                body: body.to_string(),
                semantics: MessageSemantics {
                    conversation_id: conversation_id.map(str::to_string),
                    reply_to: None,
                },
            }),
            timestamp,
        );
        sign_envelope(&mut envelope, &self.keypair);
        envelope
    }
}

/// A wired broker on a manual clock.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub broker: Broker,
}

impl Harness {
    /// Default configuration at a fixed instant.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Custom configuration at a fixed instant.
    #[must_use]
    pub fn with_config(config: BrokerConfig) -> Self {
        let clock = ManualClock::at(1_700_000_000_000);
        let broker = Broker::build_with_clock(config, clock.clone())
            .expect("test configuration must validate");
        Self { clock, broker }
    }

    /// Now on the harness clock.
    #[must_use]
    pub fn now(&self) -> u64 {
        use ainp_types::Clock as _;
        self.clock.now_ms()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
