//! In-process ONNX embedding backend via fastembed.

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, normalize_all, validate_batch};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Texts per blocking embed call, bounding peak memory.
const BATCH_SIZE: usize = 16;

/// Embedding provider that runs a fastembed ONNX model in-process.
///
/// The model is loaded lazily on first use, once, behind a [`OnceCell`]:
/// concurrent first callers wait for a single initialization instead of
/// racing to load their own copy. Inference happens on the blocking thread
/// pool; the model handle itself is mutex-guarded because fastembed needs
/// `&mut` access per embed call.
pub struct FastEmbedEmbedder {
    model_kind: EmbeddingModel,
    dimension: usize,
    model: OnceCell<Arc<Mutex<TextEmbedding>>>,
}

impl std::fmt::Debug for FastEmbedEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedEmbedder")
            .field("model_kind", &self.model_kind)
            .field("dimension", &self.dimension)
            .field("initialized", &self.model.initialized())
            .finish()
    }
}

impl FastEmbedEmbedder {
    /// Create an uninitialized provider for `model_kind`, whose vectors are
    /// `dimension` wide. The model downloads/loads on first embed.
    pub fn new(model_kind: EmbeddingModel, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config("embedding dimension must be positive"));
        }
        Ok(Self {
            model_kind,
            dimension,
            model: OnceCell::new(),
        })
    }

    /// The 768-dimension nomic model, matching the Ollama default so the
    /// two can share one collection in a fallback chain.
    pub fn nomic_default() -> Result<Self> {
        Self::new(EmbeddingModel::NomicEmbedTextV15, 768)
    }

    async fn model(&self) -> Result<Arc<Mutex<TextEmbedding>>> {
        let handle = self
            .model
            .get_or_try_init(|| async {
                let kind = self.model_kind.clone();
                tracing::info!("loading fastembed model {:?}", kind);
                let model = tokio::task::spawn_blocking(move || {
                    TextEmbedding::try_new(
                        InitOptions::new(kind).with_show_download_progress(false),
                    )
                    .map_err(|e| EmbedError::Backend { source: e })
                })
                .await??;
                Ok::<_, EmbedError>(Arc::new(Mutex::new(model)))
            })
            .await?;
        Ok(Arc::clone(handle))
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model().await?;
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(BATCH_SIZE) {
            let batch = batch.to_vec();
            let model = Arc::clone(&model);
            let batch_vectors = tokio::task::spawn_blocking(move || {
                let mut guard = model.lock().expect("embedding model lock poisoned");
                guard
                    .embed(batch, None)
                    .map_err(|e| EmbedError::Backend { source: e })
            })
            .await??;
            vectors.extend(batch_vectors);
        }

        validate_batch(self.name(), texts, &vectors, self.dimension)?;
        normalize_all(&mut vectors);
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "fastembed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_starts_uninitialized() {
        let provider = FastEmbedEmbedder::nomic_default().unwrap();
        assert_eq!(provider.dimension(), 768);
        assert_eq!(provider.name(), "fastembed");
        assert!(!provider.model.initialized());
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let result = FastEmbedEmbedder::new(EmbeddingModel::NomicEmbedTextV15, 0);
        assert!(matches!(result, Err(EmbedError::InvalidConfig(_))));
    }

    #[tokio::test]
    #[ignore] // Downloads the real nomic model; run with -- --ignored.
    async fn embeds_real_text() -> Result<()> {
        let provider = FastEmbedEmbedder::nomic_default()?;
        let texts = vec!["hello world".to_string(), "goodbye world".to_string()];
        let vectors = provider.embed_texts(&texts).await?;

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 768);
        let norm: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
        Ok(())
    }
}
