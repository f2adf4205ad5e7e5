//! Ordered fallback over embedding backends.

use crate::error::{EmbedError, Result};
use crate::provider::EmbeddingProvider;
use async_trait::async_trait;
use std::sync::Arc;

/// Tries a list of embedding providers in order until one succeeds.
///
/// This replaces implicit exception-driven backend chaining with an
/// explicit ordered list: a failure in one backend is logged and the next
/// is tried; only when every backend has failed does the chain report
/// [`EmbedError::Unavailable`]. All providers must agree on dimension so
/// the resulting vectors are interchangeable in one collection.
pub struct FallbackEmbedder {
    providers: Vec<Arc<dyn EmbeddingProvider>>,
    dimension: usize,
}

impl std::fmt::Debug for FallbackEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackEmbedder")
            .field("providers", &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FallbackEmbedder {
    /// Build a chain from `providers`, tried in the given order.
    ///
    /// Fails if the list is empty or the providers disagree on dimension.
    pub fn new(providers: Vec<Arc<dyn EmbeddingProvider>>) -> Result<Self> {
        let Some(first) = providers.first() else {
            return Err(EmbedError::invalid_config("fallback chain needs at least one provider"));
        };
        let dimension = first.dimension();
        for provider in &providers {
            if provider.dimension() != dimension {
                return Err(EmbedError::invalid_config(format!(
                    "provider '{}' has dimension {}, chain expects {}",
                    provider.name(),
                    provider.dimension(),
                    dimension
                )));
            }
        }
        Ok(Self { providers, dimension })
    }
}

#[async_trait]
impl EmbeddingProvider for FallbackEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        for provider in &self.providers {
            match provider.embed_texts(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %e,
                        "embedding backend failed, trying next"
                    );
                }
            }
        }
        Err(EmbedError::Unavailable)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "fallback"
    }
}
