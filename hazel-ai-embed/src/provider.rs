//! The embedding port: text in, vectors out.

use crate::error::{EmbedError, Result};
use async_trait::async_trait;

/// Abstract capability: ordered texts to ordered fixed-length vectors.
///
/// Implementations must be safe to call concurrently (internal model or
/// client state is protected or stateless per call) and must return exactly
/// one vector per input text, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts. Same length and order as the input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// The dimension of vectors this provider produces, queryable without
    /// running an embedding. The indexer uses this to detect schema drift
    /// before any bulk operation.
    fn dimension(&self) -> usize;

    /// Short identifier for logging.
    fn name(&self) -> &str;
}

/// L2-normalize each vector in place. Zero vectors are left untouched.
pub(crate) fn normalize_all(vectors: &mut [Vec<f32>]) {
    for vector in vectors {
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in vector.iter_mut() {
                *value /= norm;
            }
        }
    }
}

/// Check batch shape: one vector per input, all at `expected` dimension.
pub(crate) fn validate_batch(
    provider: &str,
    texts: &[String],
    vectors: &[Vec<f32>],
    expected: usize,
) -> Result<()> {
    if vectors.len() != texts.len() {
        return Err(EmbedError::CountMismatch {
            provider: provider.to_string(),
            expected: texts.len(),
            got: vectors.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
        return Err(EmbedError::DimensionMismatch {
            provider: provider.to_string(),
            expected,
            got: bad.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_produces_unit_vectors() {
        let mut vectors = vec![vec![3.0, 4.0], vec![0.0, 0.0]];
        normalize_all(&mut vectors);

        let norm: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert_eq!(vectors[1], vec![0.0, 0.0]);
    }

    #[test]
    fn validation_rejects_shape_mismatches() {
        let texts = vec!["a".to_string(), "b".to_string()];

        let short = vec![vec![0.0; 4]];
        assert!(matches!(
            validate_batch("test", &texts, &short, 4),
            Err(EmbedError::CountMismatch { .. })
        ));

        let wrong_dim = vec![vec![0.0; 4], vec![0.0; 3]];
        assert!(matches!(
            validate_batch("test", &texts, &wrong_dim, 4),
            Err(EmbedError::DimensionMismatch { .. })
        ));

        let good = vec![vec![0.0; 4], vec![0.0; 4]];
        assert!(validate_batch("test", &texts, &good, 4).is_ok());
    }
}
