//! Deterministic feature-hashing embedder.
//!
//! No model, no network: each alphanumeric token is hashed into a bucket
//! and the bucket counts are L2-normalized. Vectors are stable across runs
//! for the same input, which makes this the embedder of choice for tests
//! and offline smoke runs. Retrieval quality is bag-of-words at best.

use crate::provider::{EmbeddingProvider, normalize_all};
use crate::{EmbedError, Result};
use async_trait::async_trait;
use std::hash::{DefaultHasher, Hash, Hasher};

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be nonzero"));
        }
        Ok(Self { dimension })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            // Signed buckets cancel unrelated collisions on average.
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| self.embed_one(t)).collect();
        normalize_all(&mut vectors);
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
