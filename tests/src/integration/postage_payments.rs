//! Postage enforcement and the payment-challenge retry loop: insufficient
//! balance blocks delivery, a confirmed top-up unblocks it.

#[cfg(test)]
mod tests {
    use crate::helpers::{Harness, TestAgent};
    use ainp_guard::GuardError;
    use ainp_ledger::PaymentMethod;
    use ainp_routing::RouteError;
    use ainp_types::BrokerConfig;

    fn postage_config() -> BrokerConfig {
        let mut config = BrokerConfig::default();
        config.mail_policy.postage_enabled = true;
        config.mail_policy.postage_amount_atomic = 100;
        config
    }

    #[tokio::test]
    async fn test_insufficient_balance_blocks_then_topup_unblocks() {
        let harness = Harness::with_config(postage_config());
        let state = &harness.broker.state;
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);

        // A can afford half a stamp
        state.ledger.create_account(&alice.did, 50).unwrap();

        let first = alice.signed_chat(&bob.did, "cold outreach", None, harness.now());
        let err = state.routing.deliver(&first).await.unwrap_err();
        assert_eq!(
            err,
            RouteError::Guard(GuardError::PaymentRequired {
                required: 100,
                available: 50
            })
        );
        assert_eq!(state.mail.message_count(), 0);

        // the 402 challenge references a payment request; settle it
        let request = state
            .payments
            .create_request(
                alice.did.clone(),
                100,
                PaymentMethod::Lightning,
                None,
                Some("postage top-up".into()),
                None,
            )
            .unwrap();
        state
            .payments
            .confirm(request.id, "lightning", "ln-tx-77", serde_json::Value::Null)
            .unwrap();
        assert_eq!(state.ledger.balance(&alice.did).unwrap().balance, 150);

        // retry with a fresh envelope id clears postage
        let retry = alice.signed_chat(&bob.did, "cold outreach, stamped", None, harness.now());
        let outcome = state.routing.deliver(&retry).await.unwrap();
        assert_eq!(outcome.agent_count, 1);

        let account = state.ledger.balance(&alice.did).unwrap();
        assert_eq!(account.balance, 50);
        assert_eq!(account.spent, 100);
        assert_eq!(state.mail.message_count(), 1);
    }

    #[tokio::test]
    async fn test_allowlisted_sender_skips_postage() {
        let harness = Harness::with_config(postage_config());
        let state = &harness.broker.state;
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);
        // no account at all, but B trusts A
        state.mail.set_consent(
            &bob.did,
            &alice.did,
            ainp_mail::ConsentState::Trusted,
            None,
            None,
        );

        let envelope = alice.signed_chat(&bob.did, "hello friend", None, harness.now());
        assert!(state.routing.deliver(&envelope).await.is_ok());
    }

    #[tokio::test]
    async fn test_greylist_delay_then_resend() {
        let mut config = BrokerConfig::default();
        config.mail_policy.greylist_enabled = true;
        config.mail_policy.greylist_delay_secs = 60;
        let harness = Harness::with_config(config);
        let state = &harness.broker.state;
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);

        let first = alice.signed_chat(&bob.did, "first contact", None, harness.now());
        let err = state.routing.deliver(&first).await.unwrap_err();
        assert_eq!(
            err,
            RouteError::Guard(GuardError::TooEarly {
                retry_after_secs: 60
            })
        );

        // resend after the delay with a fresh envelope
        harness.clock.advance_ms(61_000);
        let resend = alice.signed_chat(&bob.did, "first contact, again", None, harness.now());
        assert!(state.routing.deliver(&resend).await.is_ok());

        // once mail flowed both rows exist and the pair is warm
        let reply = TestAgent::from_seed(2).signed_chat(&alice.did, "warm now", None, harness.now());
        assert!(state.routing.deliver(&reply).await.is_ok());
    }
}
