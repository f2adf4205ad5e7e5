//! Vector store port for the hazel indexing pipeline.
//!
//! A [`VectorStore`] is a single named collection of points, each a
//! `(vector, payload)` pair addressed by a stable string id. The port
//! supports idempotent upsert, delete-by-file, cosine nearest-neighbor
//! search, and dimension introspection with recreate-on-drift.
//!
//! Two implementations ship here:
//!
//! - [`MemoryStore`]: brute-force in-process store used by tests and
//!   smoke runs.
//! - [`QdrantStore`]: adapter over a Qdrant server.
//!
//! Recreating a collection on dimension change destroys every stored
//! point. That is an explicit, accepted data-loss path: the embedding
//! backend changed shape, so every existing vector is unusable anyway.

pub mod error;
pub mod memory;
pub mod qdrant_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use qdrant_store::QdrantStore;

/// Payload stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    /// Root-relative path of the source file.
    pub file_path: String,
    /// Chunk emission order within the file.
    pub sequence: usize,
    /// Byte offset of the chunk start in the normalized file text.
    pub char_start: usize,
    /// Byte offset one past the chunk end.
    pub char_end: usize,
    /// First covered line, 1-based.
    pub line_start: usize,
    /// Last covered line, 1-based, inclusive.
    pub line_end: usize,
    /// Chunk text, stored verbatim so retrieval does not depend on the
    /// live file still existing.
    pub text: Option<String>,
}

/// The persisted unit: a vector plus payload under a stable id.
///
/// Ids take the form `hash(file_path) + "_" + sequence`, so re-indexing a
/// file with unchanged chunk boundaries overwrites points in place.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// One search result: the matched point's payload and its cosine
/// similarity to the query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: PointPayload,
}

/// A named collection of points supporting upsert, filtered delete, and
/// nearest-neighbor search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotently ensure the collection exists at `dimension`. If it
    /// exists with a different dimension it is destroyed and recreated
    /// empty.
    async fn ensure_collection(&self, dimension: usize) -> Result<()>;

    /// Insert-or-replace by id. Safe to call repeatedly with the same ids.
    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<()>;

    /// Remove every point whose payload `file_path` equals the given
    /// relative path. Unknown paths are a no-op.
    async fn delete_for_file(&self, file_path: &str) -> Result<()>;

    /// Nearest neighbors by descending cosine similarity, at most `limit`
    /// hits. A cold or missing collection yields an empty Vec.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>>;

    /// Total number of stored points.
    async fn point_count(&self) -> Result<usize>;
}

/// Cosine similarity; zero-norm inputs score 0.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
