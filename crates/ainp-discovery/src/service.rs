//! # Discovery Service
//!
//! Registration is transactional per agent: the new capability set is
//! fully embedded before the agent's rows are swapped, so a reader never
//! observes a half-replaced set. Search follows the ranked pipeline
//! described in the crate docs, with a short-TTL query cache.

use crate::domain::{AgentRecord, Capability, TrustDimension, TrustVector, UsefulnessEntry};
use crate::embedding::{cosine_similarity, EmbeddingError, EmbeddingProvider};
use ainp_crypto::{extract_public_key, sha256_hex};
use ainp_types::config::DiscoveryConfig;
use ainp_types::{CapabilitySpec, Clock, Did, DiscoveryMatch, DiscoveryQuery};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Discovery errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// Registration carried no capabilities.
    #[error("registration requires at least one capability")]
    NoCapabilities,

    /// Agent not registered.
    #[error("agent not found: {0}")]
    AgentNotFound(Did),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Search result plus degradation marker.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub matches: Vec<DiscoveryMatch>,
    /// The embedding provider was down and ranking fell back to tag-only.
    pub degraded: bool,
}

struct CachedQuery {
    matches: Vec<DiscoveryMatch>,
    cached_at: u64,
}

/// The capability/discovery store.
pub struct DiscoveryService {
    clock: Arc<dyn Clock>,
    config: DiscoveryConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    /// description-hash -> embedding.
    embedding_cache: DashMap<String, Vec<f32>>,
    agents: DashMap<Did, AgentRecord>,
    capabilities: DashMap<Did, Vec<Capability>>,
    trust: DashMap<Did, TrustVector>,
    usefulness: DashMap<Did, UsefulnessEntry>,
    /// Committee staking balances (admin-managed).
    stakes: DashMap<Did, u64>,
    query_cache: Mutex<HashMap<String, CachedQuery>>,
}

impl DiscoveryService {
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        config: DiscoveryConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            clock,
            config,
            embedder,
            embedding_cache: DashMap::new(),
            agents: DashMap::new(),
            capabilities: DashMap::new(),
            trust: DashMap::new(),
            usefulness: DashMap::new(),
            stakes: DashMap::new(),
            query_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register (or re-register) an agent with its capability set.
    ///
    /// Prior capabilities are replaced wholesale; registering the same set
    /// twice leaves it unchanged. Returns the number of stored
    /// capabilities.
    pub async fn register(
        &self,
        did: &Did,
        specs: &[CapabilitySpec],
        trust_seed: Option<f64>,
        ttl_seconds: Option<u64>,
    ) -> Result<usize, DiscoveryError> {
        if specs.is_empty() {
            return Err(DiscoveryError::NoCapabilities);
        }

        // embed everything before touching rows
        let mut rows = Vec::with_capacity(specs.len());
        for spec in specs {
            let embedding = self.embedding_for(&spec.description).await?;
            rows.push(Capability::from_spec(spec, embedding));
        }
        // (agent, description) unique: first occurrence wins
        let mut seen = std::collections::HashSet::new();
        rows.retain(|capability| seen.insert(capability.description.clone()));

        let now = self.clock.now_ms();
        let public_key = extract_public_key(did)
            .ok()
            .map(|key| key.as_bytes().to_vec());
        let expires_at = ttl_seconds.map(|ttl| now + ttl * 1_000);

        let stored = rows.len();
        self.agents
            .entry(did.clone())
            .and_modify(|record| {
                record.last_seen_at = now;
                record.expires_at = expires_at;
            })
            .or_insert_with(|| AgentRecord {
                did: did.clone(),
                public_key,
                created_at: now,
                last_seen_at: now,
                expires_at,
            });
        self.capabilities.insert(did.clone(), rows);
        self.trust.entry(did.clone()).or_insert_with(|| {
            TrustVector::seeded(trust_seed.unwrap_or(TrustVector::DEFAULT_SEED), now)
        });

        info!(agent = %did, capabilities = stored, "Agent registered");
        Ok(stored)
    }

    /// Ranked semantic search.
    pub async fn search(&self, query: &DiscoveryQuery) -> SearchOutcome {
        let now = self.clock.now_ms();
        let cache_key = self.query_cache_key(query);
        if let Some(hit) = self.cached_result(&cache_key, now) {
            return SearchOutcome {
                matches: hit,
                degraded: false,
            };
        }

        let (query_embedding, degraded) = match &query.description {
            Some(description) => match self.embedding_for(description).await {
                Ok(embedding) => (Some(embedding), false),
                Err(EmbeddingError::Unavailable) => {
                    warn!("Embedding provider down, tag-only discovery");
                    (None, true)
                }
                Err(err) => {
                    warn!(error = %err, "Embedding failed, tag-only discovery");
                    (None, true)
                }
            },
            None => (None, false),
        };

        let matches = self.rank(query, query_embedding.as_deref(), now);
        if !degraded {
            self.query_cache.lock().insert(
                cache_key,
                CachedQuery {
                    matches: matches.clone(),
                    cached_at: now,
                },
            );
        }
        SearchOutcome { matches, degraded }
    }

    /// Update `last_seen_at` for an active agent.
    pub fn touch(&self, did: &Did) {
        if let Some(mut record) = self.agents.get_mut(did) {
            record.last_seen_at = self.clock.now_ms();
        }
    }

    /// Agent row, when registered.
    #[must_use]
    pub fn agent(&self, did: &Did) -> Option<AgentRecord> {
        self.agents.get(did).map(|r| r.clone())
    }

    /// Whether the agent is registered and unexpired.
    #[must_use]
    pub fn is_active(&self, did: &Did) -> bool {
        let now = self.clock.now_ms();
        self.agents
            .get(did)
            .is_some_and(|record| !record.is_expired(now))
    }

    /// Current trust vector, when present.
    #[must_use]
    pub fn trust_vector(&self, did: &Did) -> Option<TrustVector> {
        self.trust.get(did).map(|t| t.clone())
    }

    /// Apply a trust observation after settled work.
    pub fn observe_trust(
        &self,
        did: &Did,
        dimension: TrustDimension,
        observation: f64,
        alpha: f64,
    ) {
        let now = self.clock.now_ms();
        let mut entry = self
            .trust
            .entry(did.clone())
            .or_insert_with(|| TrustVector::seeded(TrustVector::DEFAULT_SEED, now));
        entry.observe(dimension, observation, alpha, now);
    }

    /// Scheduled decay pass: every trust vector drifts toward neutral by
    /// its decay rate over the time since its last update.
    pub fn decay_trust(&self) {
        let now = self.clock.now_ms();
        for mut entry in self.trust.iter_mut() {
            let elapsed_days = now.saturating_sub(entry.updated_at) as f64 / 86_400_000.0;
            if elapsed_days > 0.0 {
                entry.decay(elapsed_days, now);
            }
        }
    }

    /// Write back the aggregated usefulness score (bounded to [0,100]).
    pub fn set_usefulness(&self, did: &Did, score: f64) {
        let now = self.clock.now_ms();
        self.usefulness.insert(
            did.clone(),
            UsefulnessEntry {
                score: score.clamp(0.0, 100.0),
                updated_at: now,
            },
        );
    }

    /// Cached usefulness, when computed.
    #[must_use]
    pub fn usefulness(&self, did: &Did) -> Option<UsefulnessEntry> {
        self.usefulness.get(did).map(|u| *u)
    }

    /// Admin: set a committee stake for an agent.
    pub fn set_stake(&self, did: &Did, stake: u64) {
        self.stakes.insert(did.clone(), stake);
    }

    /// Committee eligibility, ranked by aggregate trust, then cached
    /// usefulness, then identifier. The caller applies the seeded shuffle.
    #[must_use]
    pub fn committee_candidates(&self, exclude: &[&Did], require_stake: bool) -> Vec<Did> {
        let now = self.clock.now_ms();
        let mut candidates: Vec<(Did, f64, f64)> = self
            .agents
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .filter(|entry| !exclude.contains(&&entry.did))
            .filter(|entry| {
                !require_stake || self.stakes.get(&entry.did).map_or(0, |s| *s) > 0
            })
            .map(|entry| {
                let trust = self
                    .trust
                    .get(&entry.did)
                    .map(|t| t.aggregate())
                    .unwrap_or(TrustVector::DEFAULT_SEED);
                let usefulness = self.usefulness.get(&entry.did).map_or(0.0, |u| u.score);
                (entry.did.clone(), trust, usefulness)
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| b.2.total_cmp(&a.2))
                .then_with(|| a.0.cmp(&b.0))
        });
        candidates.into_iter().map(|(did, _, _)| did).collect()
    }

    /// Number of registered agents (including expired ones).
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    async fn embedding_for(&self, description: &str) -> Result<Vec<f32>, EmbeddingError> {
        let key = sha256_hex(description.as_bytes());
        if let Some(hit) = self.embedding_cache.get(&key) {
            return Ok(hit.clone());
        }
        let embedding = self.embedder.embed(description).await?;
        self.embedding_cache.insert(key, embedding.clone());
        Ok(embedding)
    }

    fn rank(
        &self,
        query: &DiscoveryQuery,
        query_embedding: Option<&[f32]>,
        now: u64,
    ) -> Vec<DiscoveryMatch> {
        struct Candidate {
            did: Did,
            description: String,
            similarity: f64,
            trust: f64,
            usefulness: Option<f64>,
            score: f64,
            last_seen_at: u64,
        }

        let mut candidates: Vec<Candidate> = Vec::new();
        for entry in self.capabilities.iter() {
            let did = entry.key();
            let Some(agent) = self.agents.get(did) else {
                continue;
            };
            if agent.is_expired(now) {
                continue;
            }

            // closest capability for this agent that satisfies the filters
            let mut best: Option<(f64, &Capability)> = None;
            for capability in entry.value() {
                if !capability.covers_tags(&query.tags) {
                    continue;
                }
                if let (Some(limit), Some(latency)) = (query.max_latency_ms, capability.latency_ms)
                {
                    if latency > limit {
                        continue;
                    }
                }
                if let (Some(limit), Some(cost)) = (query.max_cost, capability.cost) {
                    if cost > limit {
                        continue;
                    }
                }
                let similarity = match query_embedding {
                    Some(qe) => cosine_similarity(qe, &capability.embedding),
                    None => 0.0,
                };
                if query_embedding.is_some() && similarity < self.config.similarity_threshold {
                    continue;
                }
                if best.as_ref().map_or(true, |(s, _)| similarity > *s) {
                    best = Some((similarity, capability));
                }
            }
            let Some((similarity, capability)) = best else {
                continue;
            };

            let trust = self
                .trust
                .get(did)
                .map(|t| t.aggregate())
                .unwrap_or(TrustVector::DEFAULT_SEED);
            if query.min_trust.is_some_and(|min| trust < min) {
                continue;
            }

            let usefulness = self.usefulness.get(did).map(|u| u.score);
            let score = self.blend(similarity, trust, usefulness);
            candidates.push(Candidate {
                did: did.clone(),
                description: capability.description.clone(),
                similarity,
                trust,
                usefulness,
                score,
                last_seen_at: agent.last_seen_at,
            });
        }

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                // lower distance = higher similarity
                .then_with(|| b.similarity.total_cmp(&a.similarity))
                .then_with(|| b.last_seen_at.cmp(&a.last_seen_at))
                .then_with(|| a.did.cmp(&b.did))
        });

        let limit = query
            .limit
            .unwrap_or(self.config.search_limit)
            .min(self.config.search_limit.max(1));
        debug!(candidates = candidates.len(), limit, "Discovery ranked");
        candidates
            .into_iter()
            .take(limit)
            .map(|c| DiscoveryMatch {
                did: c.did,
                description: c.description,
                similarity: c.similarity,
                trust: c.trust,
                usefulness: c.usefulness,
                score: c.score,
            })
            .collect()
    }

    fn blend(&self, similarity: f64, trust: f64, usefulness: Option<f64>) -> f64 {
        if self.config.usefulness_ranking_enabled {
            self.config.similarity_weight * similarity
                + self.config.trust_weight * trust
                + self.config.usefulness_weight * usefulness.unwrap_or(0.0) / 100.0
        } else {
            // classic blend folds the usefulness share into trust
            let trust_weight = self.config.trust_weight + self.config.usefulness_weight;
            self.config.similarity_weight * similarity + trust_weight * trust
        }
    }

    fn query_cache_key(&self, query: &DiscoveryQuery) -> String {
        let description_hash = query
            .description
            .as_deref()
            .map(|d| sha256_hex(d.as_bytes()))
            .unwrap_or_default();
        let mut tags = query.tags.clone();
        tags.sort();
        format!(
            "{description_hash}|{}|{:?}|{:?}|{:?}|{:?}",
            tags.join(","),
            query.min_trust,
            query.max_latency_ms,
            query.max_cost,
            query.limit
        )
    }

    fn cached_result(&self, key: &str, now: u64) -> Option<Vec<DiscoveryMatch>> {
        let ttl_ms = self.config.query_cache_ttl_secs * 1_000;
        let mut cache = self.query_cache.lock();
        cache.retain(|_, entry| now.saturating_sub(entry.cached_at) < ttl_ms);
        cache.get(key).map(|entry| entry.matches.clone())
    }
}
