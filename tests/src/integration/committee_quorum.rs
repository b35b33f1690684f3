//! Committee selection and quorum finalization through the wired broker:
//! settle creates the receipt, committee members attest, the finalizer
//! flips it, and reputation moves.

#[cfg(test)]
mod tests {
    use crate::helpers::{Harness, TestAgent};
    use ainp_pou::{AttestationType, PouError, ReceiptStatus};
    use ainp_types::CapabilitySpec;
    use serde_json::json;
    use uuid::Uuid;

    fn capability(n: usize) -> CapabilitySpec {
        CapabilitySpec {
            description: format!("validator skill {n}"),
            tags: vec!["attest".into()],
            version: "1.0.0".into(),
            evidence_ref: None,
            latency_ms: None,
            cost: None,
        }
    }

    /// Register `n` eligible committee agents beyond the two parties.
    async fn with_committee_pool(harness: &Harness, n: usize) -> Vec<TestAgent> {
        let mut agents = Vec::new();
        for i in 0..n {
            let agent = TestAgent::from_seed(100 + i as u8);
            harness
                .broker
                .state
                .discovery
                .register(&agent.did, &[capability(i)], Some(0.8), None)
                .await
                .unwrap();
            agents.push(agent);
        }
        agents
    }

    async fn settled_receipt(harness: &Harness, alice: &TestAgent, bob: &TestAgent) -> Uuid {
        let state = &harness.broker.state;
        state.ledger.create_account(&alice.did, 1_000_000).unwrap();
        let session = state
            .negotiation
            .initiate(
                "intent-q".into(),
                alice.did.clone(),
                bob.did.clone(),
                json!({"price": 90}),
                None,
                None,
            )
            .await
            .unwrap();
        state
            .negotiation
            .counter(session.id, &bob.did, json!({"price": 90}))
            .await
            .unwrap();
        state.negotiation.accept(session.id, &alice.did).await.unwrap();
        let outcome = state
            .negotiation
            .settle(session.id, &alice.did, None, None, None)
            .await
            .unwrap();
        outcome.receipt_id.expect("receipt pipeline wired")
    }

    #[tokio::test]
    async fn test_finalizes_at_third_audit_pass() {
        let harness = Harness::new();
        let state = &harness.broker.state;
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);
        with_committee_pool(&harness, 7).await;

        let receipt_id = settled_receipt(&harness, &alice, &bob).await;
        let receipt = state.receipts.receipt(receipt_id).unwrap();
        assert_eq!(receipt.committee.len(), 5);
        assert_eq!(receipt.quorum_k, 3);

        let committee = receipt.committee.clone();
        // two audits plus the client acceptance: still pending
        for member in committee.iter().take(2) {
            state
                .receipts
                .attest(receipt_id, member, AttestationType::AuditPass, 0.9, 0.9, None, None)
                .unwrap();
        }
        state
            .receipts
            .attest(receipt_id, &alice.did, AttestationType::Accepted, 1.0, 1.0, None, None)
            .unwrap();
        assert_eq!(state.receipts.finalize_due(), 0);
        assert_eq!(
            state.receipts.receipt(receipt_id).unwrap().status,
            ReceiptStatus::Pending
        );

        // the third distinct committee audit reaches quorum
        state
            .receipts
            .attest(receipt_id, &committee[2], AttestationType::AuditPass, 0.85, 0.9, None, None)
            .unwrap();
        assert_eq!(state.receipts.finalize_due(), 1);
        let finalized = state.receipts.receipt(receipt_id).unwrap();
        assert_eq!(finalized.status, ReceiptStatus::Finalized);
        assert!(finalized.finalized_at.is_some());

        // re-submission after the fact is rejected as closed
        let err = state
            .receipts
            .attest(receipt_id, &committee[0], AttestationType::AuditPass, 0.9, 0.9, None, None)
            .unwrap_err();
        assert!(matches!(err, PouError::ReceiptClosed { .. }));

        // provider reputation moved
        let reputation = state.receipts.reputation(&bob.did).unwrap();
        assert!(reputation.reliability > 0.5);
    }

    #[tokio::test]
    async fn test_duplicate_attestation_conflict() {
        let harness = Harness::new();
        let state = &harness.broker.state;
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);
        with_committee_pool(&harness, 6).await;

        let receipt_id = settled_receipt(&harness, &alice, &bob).await;
        let committee = state.receipts.committee(receipt_id).unwrap();

        state
            .receipts
            .attest(receipt_id, &committee[0], AttestationType::AuditPass, 0.9, 0.9, None, None)
            .unwrap();
        let err = state
            .receipts
            .attest(receipt_id, &committee[0], AttestationType::AuditPass, 0.9, 0.9, None, None)
            .unwrap_err();
        assert_eq!(err, PouError::DuplicateAttestation);
    }

    #[tokio::test]
    async fn test_short_pool_scales_quorum() {
        let harness = Harness::new();
        let state = &harness.broker.state;
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);
        // only three eligible agents exist
        with_committee_pool(&harness, 3).await;

        let receipt_id = settled_receipt(&harness, &alice, &bob).await;
        let receipt = state.receipts.receipt(receipt_id).unwrap();
        assert_eq!(receipt.committee.len(), 3);
        // ceil(3 * 3 / 5) = 2
        assert_eq!(receipt.quorum_k, 2);

        for member in receipt.committee.iter().take(2) {
            state
                .receipts
                .attest(receipt_id, member, AttestationType::AuditPass, 0.9, 0.9, None, None)
                .unwrap();
        }
        assert_eq!(state.receipts.finalize_due(), 1);
        assert_eq!(
            state.receipts.receipt(receipt_id).unwrap().status,
            ReceiptStatus::Finalized
        );
    }

    #[tokio::test]
    async fn test_committee_excludes_parties_and_is_deterministic() {
        let harness = Harness::new();
        let state = &harness.broker.state;
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);
        with_committee_pool(&harness, 8).await;

        let receipt_id = settled_receipt(&harness, &alice, &bob).await;
        let receipt = state.receipts.receipt(receipt_id).unwrap();
        assert!(!receipt.committee.contains(&alice.did));
        assert!(!receipt.committee.contains(&bob.did));

        // the stored seed reproduces the committee from the same roster
        let seed = hex_decode(&receipt.selection_seed);
        let ranked = state
            .discovery
            .committee_candidates(&[&bob.did, &alice.did], false);
        let reselected = ainp_pou::select_committee(&seed, &ranked, receipt.committee_m);
        assert_eq!(reselected, receipt.committee);
    }

    fn hex_decode(hex: &str) -> Vec<u8> {
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
            .collect()
    }
}
