//! # Embedding Provider Port
//!
//! The embedding model is an external collaborator; the registry only
//! depends on this seam. Results are cached by the SHA-256 of the
//! description text, so re-registration and repeated queries never
//! recompute.
//!
//! The in-process [`HashEmbedder`] derives a deterministic pseudo-embedding
//! from the text digest. It has no semantic power but gives stable, fully
//! reproducible rankings for development profiles and tests.

use ainp_crypto::sha256;
use async_trait::async_trait;
use thiserror::Error;

/// Fixed embedding width, shared by registration and search.
pub const EMBEDDING_DIM: usize = 384;

/// Embedding provider failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    /// Provider unreachable; discovery degrades to tag-only filtering.
    #[error("embedding provider unavailable")]
    Unavailable,

    /// Provider returned a vector of the wrong width.
    #[error("embedding dimension {got}, expected {expected}")]
    DimensionMismatch { got: usize, expected: usize },
}

/// Computes description embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a text into the fixed-dimension space.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Deterministic digest-derived embedder.
///
/// Expands SHA-256 of the text into [`EMBEDDING_DIM`] floats in [-1,1] and
/// L2-normalizes. Identical text always embeds identically.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashEmbedder;

impl HashEmbedder {
    /// Synchronous embedding used internally and by tests.
    #[must_use]
    pub fn embed_sync(text: &str) -> Vec<f32> {
        let mut values = Vec::with_capacity(EMBEDDING_DIM);
        let base = sha256(text.as_bytes());
        let mut counter: u32 = 0;
        while values.len() < EMBEDDING_DIM {
            let mut block_input = Vec::with_capacity(36);
            block_input.extend_from_slice(&base);
            block_input.extend_from_slice(&counter.to_be_bytes());
            let block = sha256(&block_input);
            for byte in block {
                if values.len() == EMBEDDING_DIM {
                    break;
                }
                values.push(f32::from(byte) / 127.5 - 1.0);
            }
            counter += 1;
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        values
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(Self::embed_sync(text))
    }
}

/// Cosine similarity clamped to [0,1]; opposite directions count as 0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}
