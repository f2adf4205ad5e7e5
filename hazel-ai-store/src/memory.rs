//! In-process vector store with brute-force search.

use crate::{IndexPoint, Result, SearchHit, VectorStore, cosine_similarity};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    dimension: Option<usize>,
    points: HashMap<String, IndexPoint>,
}

/// HashMap-backed store. Search is a linear cosine scan, which is plenty
/// for tests and small corpora.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configured dimension, if the collection has been created.
    pub async fn dimension(&self) -> Option<usize> {
        self.inner.read().await.dimension
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.dimension {
            Some(existing) if existing == dimension => {}
            Some(existing) => {
                tracing::warn!(
                    existing,
                    requested = dimension,
                    "collection dimension changed, recreating empty"
                );
                inner.points.clear();
                inner.dimension = Some(dimension);
            }
            None => inner.dimension = Some(dimension),
        }
        Ok(())
    }

    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<()> {
        let mut inner = self.inner.write().await;
        for point in points {
            inner.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn delete_for_file(&self, file_path: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.points.retain(|_, p| p.payload.file_path != file_path);
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let inner = self.inner.read().await;
        if inner.dimension.is_none() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = inner
            .points
            .values()
            .map(|p| SearchHit {
                id: p.id.clone(),
                score: cosine_similarity(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn point_count(&self) -> Result<usize> {
        Ok(self.inner.read().await.points.len())
    }
}
