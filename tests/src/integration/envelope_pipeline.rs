//! End-to-end envelope pipeline: verified ingress through stream, mail,
//! and socket delivery, plus the replay and deadline rejections.

#[cfg(test)]
mod tests {
    use crate::helpers::{Harness, TestAgent};
    use ainp_bus::{Category, Subject};
    use ainp_routing::RouteError;

    #[tokio::test]
    async fn test_direct_intent_happy_path() {
        let harness = Harness::new();
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);
        let state = &harness.broker.state;

        // B holds an open socket
        let mut socket_rx = state.sockets.connect(&bob.did);

        let envelope = alice.signed_chat(&bob.did, "hello bob", Some("conv-1"), harness.now());
        let envelope_id = envelope.id.clone();
        let outcome = state.routing.deliver(&envelope).await.unwrap();
        assert_eq!(outcome.agent_count, 1);

        // one message on B's intents subject
        let subject = Subject::for_agent(Category::Intents, &bob.did);
        assert_eq!(state.bus.subject_len(&subject), 1);

        // mail row with matching envelope id, thread rolled up
        let (thread, messages) = state.mail.thread("conv-1").unwrap();
        assert_eq!(thread.message_count, 1);
        assert_eq!(thread.unread_count, 1);
        assert_eq!(messages[0].envelope_id, envelope_id);

        // B's socket received exactly one frame
        let frame = socket_rx.try_recv().unwrap();
        assert_eq!(frame.id, envelope_id);
        assert!(socket_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_replay_rejected_without_side_effects() {
        let harness = Harness::new();
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);
        let state = &harness.broker.state;

        let envelope = alice.signed_chat(&bob.did, "hello", Some("conv-1"), harness.now());
        state.routing.deliver(&envelope).await.unwrap();

        let err = state.routing.deliver(&envelope).await.unwrap_err();
        assert!(matches!(
            err,
            RouteError::Guard(ainp_guard::GuardError::Duplicate { .. })
        ));

        let subject = Subject::for_agent(Category::Intents, &bob.did);
        assert_eq!(state.bus.subject_len(&subject), 1);
        assert_eq!(state.mail.message_count(), 1);
    }

    #[tokio::test]
    async fn test_deadline_boundary() {
        let harness = Harness::new();
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);
        let state = &harness.broker.state;
        let now = harness.now();

        // timestamp + ttl == now is accepted
        let mut on_boundary = alice.signed_chat(&bob.did, "just in time", None, now - 300_000);
        on_boundary.ttl = 300_000;
        ainp_crypto::sign_envelope(&mut on_boundary, &alice.keypair);
        assert!(state.routing.deliver(&on_boundary).await.is_ok());

        // one millisecond past the deadline is rejected
        let mut too_late = alice.signed_chat(&bob.did, "too late", None, now - 300_001);
        too_late.ttl = 300_000;
        ainp_crypto::sign_envelope(&mut too_late, &alice.keypair);
        let err = state.routing.deliver(&too_late).await.unwrap_err();
        assert!(matches!(
            err,
            RouteError::Guard(ainp_guard::GuardError::ExpiredOrFuture { .. })
        ));
    }

    #[tokio::test]
    async fn test_disconnected_agent_resumes_from_stream() {
        let harness = Harness::new();
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);
        let state = &harness.broker.state;

        // no socket: delivery still lands on the durable subject
        let envelope = alice.signed_chat(&bob.did, "while you were away", None, harness.now());
        state.routing.deliver(&envelope).await.unwrap();

        let subject = Subject::for_agent(Category::Intents, &bob.did);
        let pending = state.bus.fetch(&subject, bob.did.as_str(), 100);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].envelope.id, envelope.id);

        // acked messages are not replayed again
        state.bus.ack(&subject, bob.did.as_str(), pending[0].offset);
        assert!(state.bus.fetch(&subject, bob.did.as_str(), 100).is_empty());
    }

    #[tokio::test]
    async fn test_body_hash_matches_canonical_body() {
        let harness = Harness::new();
        let alice = TestAgent::from_seed(1);
        let bob = TestAgent::from_seed(2);
        let state = &harness.broker.state;

        let envelope = alice.signed_chat(&bob.did, "hash me", None, harness.now());
        state.routing.deliver(&envelope).await.unwrap();
        let row = state.mail.message(&envelope.id).unwrap();
        assert_eq!(row.body_hash, ainp_crypto::sha256_hex(b"hash me"));
    }
}
