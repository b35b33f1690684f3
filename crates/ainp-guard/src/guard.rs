//! # Composed Guard Pipeline
//!
//! Wires the sub-policies into the single check the routing service runs
//! on every verified envelope. Policy toggles come from configuration;
//! contact standing (mutual, allowlisted) is supplied by the caller from
//! the mail store.

use crate::dedupe::ContentDedupeCache;
use crate::errors::GuardError;
use crate::greylist::{Greylist, GreylistDecision};
use crate::postage::{PostageCharger, PostageError};
use crate::rate_limit::{RateDecision, SlidingWindowRateLimiter};
use crate::replay::ReplayCache;
use ainp_crypto::sha256_hex;
use ainp_types::{BrokerConfig, Clock, Envelope};
use std::sync::Arc;
use tracing::{debug, warn};

/// Contact standing between the envelope's sender and recipient.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardContext {
    /// Sender and recipient both consented to each other.
    pub mutual_contacts: bool,
    /// Recipient allowlisted the sender (bypasses greylist and postage).
    pub allowlisted: bool,
}

/// Successful guard outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardVerdict {
    /// A best-effort policy store was bypassed; the response must carry a
    /// degraded marker.
    pub degraded: bool,
}

/// The anti-abuse guard.
pub struct EnvelopeGuard {
    clock: Arc<dyn Clock>,
    config: BrokerConfig,
    replay: ReplayCache,
    dedupe: ContentDedupeCache,
    greylist: Greylist,
    rate_limiter: SlidingWindowRateLimiter,
    postage: Arc<dyn PostageCharger>,
}

impl EnvelopeGuard {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, config: BrokerConfig, postage: Arc<dyn PostageCharger>) -> Self {
        let replay = ReplayCache::new();
        let dedupe = ContentDedupeCache::new(config.mail_policy.dedupe_ttl_secs);
        let greylist = Greylist::new(config.mail_policy.greylist_delay_secs);
        let rate_limiter =
            SlidingWindowRateLimiter::new(config.rate_limit.window_ms, config.rate_limit.max_requests);
        Self {
            clock,
            config,
            replay,
            dedupe,
            greylist,
            rate_limiter,
            postage,
        }
    }

    /// Run every enabled policy against the envelope, in order.
    ///
    /// # Errors
    ///
    /// The first violated policy, see [`GuardError`].
    pub async fn check(
        &self,
        envelope: &Envelope,
        ctx: GuardContext,
    ) -> Result<GuardVerdict, GuardError> {
        let now = self.clock.now_ms();
        let mut verdict = GuardVerdict::default();

        // 1. deadline window, before anything is cached
        if envelope.is_expired(now) || envelope.is_from_future(now, self.config.clock_skew_ms()) {
            return Err(GuardError::ExpiredOrFuture {
                timestamp: envelope.timestamp,
                now,
            });
        }

        // 2. replay
        if !self
            .replay
            .check_and_insert(&envelope.id, envelope.expires_at_ms(), now)
        {
            return Err(GuardError::Duplicate {
                envelope_id: envelope.id.clone(),
            });
        }

        let mail_producing = envelope.payload.is_mail_producing();

        // 3. content dedupe (email facet)
        if self.config.mail_policy.content_dedupe_enabled && mail_producing {
            if let Some(body) = envelope.payload.body_text() {
                let body_hash = sha256_hex(body.as_bytes());
                if !self.dedupe.check_and_insert(&body_hash, now) {
                    return Err(GuardError::DuplicateContent { body_hash });
                }
            }
        }

        // 4. greylist for cold pairs
        if self.config.mail_policy.greylist_enabled
            && mail_producing
            && !ctx.mutual_contacts
            && !ctx.allowlisted
        {
            if let Some(recipient) = &envelope.to_did {
                if let GreylistDecision::Delay { retry_after_secs } =
                    self.greylist
                        .check(envelope.from_did.as_str(), recipient.as_str(), now)
                {
                    debug!(sender = %envelope.from_did, recipient = %recipient, retry_after_secs, "Greylist delay");
                    return Err(GuardError::TooEarly { retry_after_secs });
                }
            }
        }

        // 5. postage for cold outbound
        if self.config.mail_policy.postage_enabled && mail_producing && !ctx.allowlisted {
            let amount = self.config.mail_policy.postage_amount_atomic;
            match self
                .postage
                .charge(&envelope.from_did, amount, &envelope.id)
                .await
            {
                Ok(()) => {}
                Err(PostageError::Insufficient {
                    required,
                    available,
                }) => {
                    return Err(GuardError::PaymentRequired {
                        required,
                        available,
                    })
                }
                Err(PostageError::Unavailable) => {
                    warn!(sender = %envelope.from_did, "Postage backend down, delivering unstamped");
                    verdict.degraded = true;
                }
            }
        }

        // 6. rate limit, last
        match self.rate_limiter.check(envelope.from_did.as_str(), now) {
            RateDecision::Allowed => {}
            RateDecision::AllowedDegraded => verdict.degraded = true,
            RateDecision::Limited { retry_after_secs } => {
                return Err(GuardError::RateLimited { retry_after_secs })
            }
        }

        Ok(verdict)
    }

    /// Fail the rate-limit store open or closed (degraded-mode control).
    pub fn set_rate_limit_available(&self, available: bool) {
        self.rate_limiter.set_available(available);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postage::NoPostage;
    use ainp_types::{ChatBody, Did, ManualClock, MessageSemantics, MsgType, Payload};
    use async_trait::async_trait;

    struct BrokePostage;

    #[async_trait]
    impl PostageCharger for BrokePostage {
        async fn charge(
            &self,
            _sender: &Did,
            amount: u64,
            _envelope_id: &str,
        ) -> Result<(), PostageError> {
            Err(PostageError::Insufficient {
                required: amount,
                available: 50,
            })
        }
    }

    fn envelope(id: &str, body: &str, timestamp: u64) -> Envelope {
        let mut env = Envelope::new(
            Did::parse("did:key:zAlice").unwrap(),
            Some(Did::parse("did:key:zBob").unwrap()),
            MsgType::Intent,
            Payload::ChatMessage(ChatBody {
                body: body.into(),
                semantics: MessageSemantics::default(),
            }),
            timestamp,
        );
        env.id = id.to_string();
        env
    }

    fn guard_with(config: BrokerConfig) -> EnvelopeGuard {
        EnvelopeGuard::new(ManualClock::at(1_000_000), config, Arc::new(NoPostage))
    }

    #[tokio::test]
    async fn test_happy_path() {
        let guard = guard_with(BrokerConfig::default());
        let verdict = guard
            .check(&envelope("E1", "hello", 1_000_000), GuardContext::default())
            .await
            .unwrap();
        assert!(!verdict.degraded);
    }

    #[tokio::test]
    async fn test_replay_rejected() {
        let guard = guard_with(BrokerConfig::default());
        let env = envelope("E1", "hello", 1_000_000);
        guard.check(&env, GuardContext::default()).await.unwrap();
        let err = guard
            .check(&envelope("E1", "different body", 1_000_000), GuardContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_expired_envelope_rejected() {
        let guard = guard_with(BrokerConfig::default());
        let mut env = envelope("E1", "x", 1_000);
        env.ttl = 10;
        let err = guard.check(&env, GuardContext::default()).await.unwrap_err();
        assert!(matches!(err, GuardError::ExpiredOrFuture { .. }));
    }

    #[tokio::test]
    async fn test_deadline_boundary_accepted() {
        let guard = guard_with(BrokerConfig::default());
        let mut env = envelope("E1", "x", 900_000);
        env.ttl = 100_000; // expires exactly at now = 1_000_000
        assert!(guard.check(&env, GuardContext::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_future_envelope_rejected() {
        let guard = guard_with(BrokerConfig::default());
        // more than 60s ahead of now
        let env = envelope("E1", "x", 1_061_001);
        let err = guard.check(&env, GuardContext::default()).await.unwrap_err();
        assert!(matches!(err, GuardError::ExpiredOrFuture { .. }));
    }

    #[tokio::test]
    async fn test_content_dedupe() {
        let guard = guard_with(BrokerConfig::default());
        guard
            .check(&envelope("E1", "same body", 1_000_000), GuardContext::default())
            .await
            .unwrap();
        let err = guard
            .check(&envelope("E2", "same body", 1_000_000), GuardContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::DuplicateContent { .. }));
    }

    #[tokio::test]
    async fn test_greylist_delays_cold_pairs() {
        let mut config = BrokerConfig::default();
        config.mail_policy.greylist_enabled = true;
        let guard = guard_with(config);
        let err = guard
            .check(&envelope("E1", "x", 1_000_000), GuardContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::TooEarly { .. }));

        // mutual contacts bypass
        let verdict = guard
            .check(
                &envelope("E2", "y", 1_000_000),
                GuardContext {
                    mutual_contacts: true,
                    allowlisted: false,
                },
            )
            .await;
        assert!(verdict.is_ok());
    }

    #[tokio::test]
    async fn test_postage_insufficient_is_payment_required() {
        let mut config = BrokerConfig::default();
        config.mail_policy.postage_enabled = true;
        let guard = EnvelopeGuard::new(
            ManualClock::at(1_000_000),
            config,
            Arc::new(BrokePostage),
        );
        let err = guard
            .check(&envelope("E1", "x", 1_000_000), GuardContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::PaymentRequired { available: 50, .. }));
    }

    #[tokio::test]
    async fn test_allowlist_bypasses_postage() {
        let mut config = BrokerConfig::default();
        config.mail_policy.postage_enabled = true;
        let guard = EnvelopeGuard::new(
            ManualClock::at(1_000_000),
            config,
            Arc::new(BrokePostage),
        );
        let verdict = guard
            .check(
                &envelope("E1", "x", 1_000_000),
                GuardContext {
                    mutual_contacts: false,
                    allowlisted: true,
                },
            )
            .await;
        assert!(verdict.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limit_kicks_in() {
        let mut config = BrokerConfig::default();
        config.rate_limit.max_requests = 2;
        let guard = guard_with(config);
        for n in 0..2 {
            guard
                .check(
                    &envelope(&format!("E{n}"), &format!("body {n}"), 1_000_000),
                    GuardContext::default(),
                )
                .await
                .unwrap();
        }
        let err = guard
            .check(&envelope("E9", "body 9", 1_000_000), GuardContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_rate_store_down_degrades() {
        let mut config = BrokerConfig::default();
        config.rate_limit.max_requests = 1;
        let guard = guard_with(config);
        guard.set_rate_limit_available(false);
        for n in 0..5 {
            let verdict = guard
                .check(
                    &envelope(&format!("E{n}"), &format!("body {n}"), 1_000_000),
                    GuardContext::default(),
                )
                .await
                .unwrap();
            assert!(verdict.degraded);
        }
    }
}
