//! # Semantic Discovery
//!
//! Capability advertisement and vector-similarity-ranked agent lookup.
//!
//! ## Ranking
//!
//! Candidates within the similarity threshold are deduplicated per agent
//! (closest capability wins), post-filtered on trust, tags, latency and
//! cost, then ranked by a blended score:
//!
//! - classic: `0.6 * similarity + 0.4 * trust`
//! - usefulness-aware (feature-gated):
//!   `0.6 * similarity + 0.3 * trust + 0.1 * usefulness/100`
//!
//! Ties break on lower distance, then more recent `last_seen_at`.
//!
//! ## Degraded mode
//!
//! When the embedding collaborator is down, search falls back to the
//! tag-only filter and marks the response degraded.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod embedding;
pub mod service;

pub use domain::{AgentRecord, Capability, TrustDimension, TrustVector, UsefulnessEntry};
pub use embedding::{
    cosine_similarity, EmbeddingError, EmbeddingProvider, HashEmbedder, EMBEDDING_DIM,
};
pub use service::{DiscoveryError, DiscoveryService, SearchOutcome};
