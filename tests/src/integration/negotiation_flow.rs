//! Negotiation full cycle against the wired broker: states, convergence,
//! reservation on accept, distribution on settle, receipt creation.

#[cfg(test)]
mod tests {
    use crate::helpers::{Harness, TestAgent};
    use ainp_negotiation::{IncentiveSplit, SessionState};
    use ainp_pou::ReceiptStatus;
    use serde_json::json;

    #[tokio::test]
    async fn test_full_cycle_with_settlement_and_receipt() {
        let harness = Harness::new();
        let state = &harness.broker.state;
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);

        // 1 credit = 1000 atomic; A can afford the eventual 90 credits
        state.ledger.create_account(&alice.did, 1_000_000).unwrap();
        state.ledger.create_account(&bob.did, 0).unwrap();

        let session = state
            .negotiation
            .initiate(
                "intent-1".into(),
                alice.did.clone(),
                bob.did.clone(),
                json!({"price": 100}),
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(session.state, SessionState::Initiated);

        let after_bob = state
            .negotiation
            .counter(session.id, &bob.did, json!({"price": 80}))
            .await
            .unwrap();
        assert_eq!(after_bob.state, SessionState::Proposed);

        let after_alice = state
            .negotiation
            .counter(session.id, &alice.did, json!({"price": 90}))
            .await
            .unwrap();
        assert_eq!(after_alice.state, SessionState::CounterProposed);
        // convergence non-decreasing while the gap narrows
        assert!(after_alice.convergence >= after_bob.convergence);

        let accepted = state.negotiation.accept(session.id, &bob.did).await.unwrap();
        assert_eq!(accepted.state, SessionState::Accepted);
        assert_eq!(accepted.reserved_atomic, 90_000);
        assert_eq!(state.ledger.balance(&alice.did).unwrap().reserved, 90_000);

        let outcome = state
            .negotiation
            .settle(
                session.id,
                &alice.did,
                Some(IncentiveSplit {
                    agent: 0.7,
                    broker: 0.1,
                    validator: 0.1,
                    pool: 0.1,
                }),
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.distribution.agent, 63_000);
        assert_eq!(outcome.distribution.broker, 9_000);
        assert_eq!(outcome.distribution.validator, 9_000);
        assert_eq!(outcome.distribution.pool, 9_000);

        let payer = state.ledger.balance(&alice.did).unwrap();
        assert_eq!(payer.spent, 90_000);
        assert_eq!(payer.reserved, 0);
        let provider = state.ledger.balance(&bob.did).unwrap();
        assert_eq!(provider.earned, 63_000);

        // settle opened a pending task receipt through the bridge
        let receipt_id = outcome.receipt_id.expect("receipt pipeline is wired");
        let receipt = state.receipts.receipt(receipt_id).unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Pending);
        assert_eq!(receipt.provider, bob.did);
        assert_eq!(receipt.client, alice.did);
        assert_eq!(receipt.amount_atomic, 90_000);
    }

    #[tokio::test]
    async fn test_notifications_reach_results_subject() {
        let harness = Harness::new();
        let state = &harness.broker.state;
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);
        state.ledger.create_account(&alice.did, 1_000_000).unwrap();

        let session = state
            .negotiation
            .initiate(
                "intent-2".into(),
                alice.did.clone(),
                bob.did.clone(),
                json!({"price": 10}),
                None,
                None,
            )
            .await
            .unwrap();

        // the responder was notified about initiation on its results subject
        let subject = ainp_bus::Subject::for_agent(ainp_bus::Category::Results, &bob.did);
        let frames = state.bus.fetch(&subject, bob.did.as_str(), 10);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].envelope.msg_type, ainp_types::MsgType::Notification);

        state
            .negotiation
            .counter(session.id, &bob.did, json!({"price": 9}))
            .await
            .unwrap();
        // counter notifies the peer (alice)
        let alice_subject = ainp_bus::Subject::for_agent(ainp_bus::Category::Results, &alice.did);
        assert_eq!(state.bus.fetch(&alice_subject, alice.did.as_str(), 10).len(), 1);
    }

    #[tokio::test]
    async fn test_expiry_sweeper_and_terminal_stability() {
        let harness = Harness::new();
        let state = &harness.broker.state;
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);

        let session = state
            .negotiation
            .initiate(
                "intent-3".into(),
                alice.did.clone(),
                bob.did.clone(),
                json!({"price": 10}),
                None,
                Some(1),
            )
            .await
            .unwrap();

        harness.clock.advance_ms(120_000);
        assert_eq!(state.negotiation.sweep_expired().await, 1);
        let expired = state.negotiation.get(session.id).await.unwrap();
        assert_eq!(expired.state, SessionState::Expired);

        // terminal states never transition again
        let err = state
            .negotiation
            .counter(session.id, &bob.did, json!({"price": 9}))
            .await
            .unwrap_err();
        assert!(matches!(err, ainp_negotiation::NegotiationError::Expired(_)));
    }
}
