//! Discovery ranking with controlled similarities: the classic blend and
//! its tie-breaks, checked against hand-computed scores.

#[cfg(test)]
mod tests {
    use ainp_discovery::{DiscoveryService, EmbeddingError, EmbeddingProvider, EMBEDDING_DIM};
    use ainp_types::config::DiscoveryConfig;
    use ainp_types::{CapabilitySpec, Did, DiscoveryQuery, ManualClock};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Embedder with hand-crafted cosine similarities against the query.
    ///
    /// The query maps to the first basis vector; each named capability
    /// maps to a vector with an exact cosine against it.
    struct RiggedEmbedder;

    fn vector_with_cosine(cosine: f64) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[0] = cosine as f32;
        v[1] = ((1.0 - cosine * cosine).max(0.0)).sqrt() as f32;
        v
    }

    #[async_trait]
    impl EmbeddingProvider for RiggedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let mut query = vec![0.0f32; EMBEDDING_DIM];
            match text {
                "the query" => query[0] = 1.0,
                // cosine distance 0.10 / 0.15 / 0.20
                "capability x" => return Ok(vector_with_cosine(0.90)),
                "capability y" => return Ok(vector_with_cosine(0.85)),
                "capability z" => return Ok(vector_with_cosine(0.80)),
                _ => query[1] = 1.0,
            }
            Ok(query)
        }
    }

    fn did(s: &str) -> Did {
        Did::parse(format!("did:key:z{s}")).unwrap()
    }

    fn capability(description: &str) -> CapabilitySpec {
        CapabilitySpec {
            description: description.into(),
            tags: vec![],
            version: "1.0.0".into(),
            evidence_ref: None,
            latency_ms: None,
            cost: None,
        }
    }

    async fn ranked_service() -> DiscoveryService {
        let service = DiscoveryService::new(
            ManualClock::at(1_000_000),
            DiscoveryConfig::default(),
            Arc::new(RiggedEmbedder),
        );
        // X: similarity 0.90, trust 0.90 -> 0.90*0.6 + 0.90*0.4 = 0.900
        // Y: similarity 0.85, trust 0.70 -> 0.85*0.6 + 0.70*0.4 = 0.790
        // Z: similarity 0.80, trust 0.95 -> 0.80*0.6 + 0.95*0.4 = 0.860
        for (name, description, trust) in [
            ("X", "capability x", 0.90),
            ("Y", "capability y", 0.70),
            ("Z", "capability z", 0.95),
        ] {
            service
                .register(&did(name), &[capability(description)], Some(trust), None)
                .await
                .unwrap();
        }
        service
    }

    #[tokio::test]
    async fn test_classic_blend_ordering() {
        let service = ranked_service().await;
        let outcome = service
            .search(&DiscoveryQuery {
                description: Some("the query".into()),
                ..DiscoveryQuery::default()
            })
            .await;

        let order: Vec<&str> = outcome
            .matches
            .iter()
            .map(|m| m.did.as_str())
            .collect();
        assert_eq!(order, vec!["did:key:zX", "did:key:zZ", "did:key:zY"]);

        let scores: Vec<f64> = outcome.matches.iter().map(|m| m.score).collect();
        assert!((scores[0] - 0.900).abs() < 1e-6);
        assert!((scores[1] - 0.860).abs() < 1e-6);
        assert!((scores[2] - 0.790).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_similarity_threshold_cuts_candidates() {
        let service = ranked_service().await;
        // default threshold is 0.7; raise the bar via a stricter config
        let strict = DiscoveryService::new(
            ManualClock::at(1_000_000),
            DiscoveryConfig {
                similarity_threshold: 0.88,
                ..DiscoveryConfig::default()
            },
            Arc::new(RiggedEmbedder),
        );
        strict
            .register(&did("X"), &[capability("capability x")], Some(0.9), None)
            .await
            .unwrap();
        strict
            .register(&did("Z"), &[capability("capability z")], Some(0.95), None)
            .await
            .unwrap();
        let outcome = strict
            .search(&DiscoveryQuery {
                description: Some("the query".into()),
                ..DiscoveryQuery::default()
            })
            .await;
        // only X (0.90) clears the 0.88 threshold
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].did, did("X"));

        // the broader default still sees all three
        let all = service
            .search(&DiscoveryQuery {
                description: Some("the query".into()),
                ..DiscoveryQuery::default()
            })
            .await;
        assert_eq!(all.matches.len(), 3);
    }

    #[tokio::test]
    async fn test_usefulness_aware_blend() {
        let service = DiscoveryService::new(
            ManualClock::at(1_000_000),
            DiscoveryConfig {
                usefulness_ranking_enabled: true,
                ..DiscoveryConfig::default()
            },
            Arc::new(RiggedEmbedder),
        );
        service
            .register(&did("X"), &[capability("capability x")], Some(0.9), None)
            .await
            .unwrap();
        service.set_usefulness(&did("X"), 50.0);

        let outcome = service
            .search(&DiscoveryQuery {
                description: Some("the query".into()),
                ..DiscoveryQuery::default()
            })
            .await;
        // 0.6*0.90 + 0.3*0.90 + 0.1*(50/100) = 0.86
        assert!((outcome.matches[0].score - 0.86).abs() < 1e-6);
        assert_eq!(outcome.matches[0].usefulness, Some(50.0));
    }
}
