//! Similarity retrieval over the indexed corpus.

use anyhow::{Context, Result};
use hazel_ai_embed::EmbeddingProvider;
use hazel_ai_store::VectorStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// One retrieved snippet with its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub file_path: String,
    pub line_start: usize,
    pub line_end: usize,
    pub score: f32,
    pub text: String,
}

/// Embeds a query and maps store hits back to source snippets.
///
/// Snippet text comes from the stored payload when present; only points
/// written before text storage existed fall back to slicing the live file,
/// and hits whose file has since vanished are dropped rather than surfaced
/// as errors.
pub struct Retriever {
    root: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(
        root: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            root: root.into(),
            embedder,
            store,
        }
    }

    /// Top `top_k` snippets by cosine similarity, best first. A blank
    /// query returns no results without touching the embedding backend.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self
            .embedder
            .embed_texts(std::slice::from_ref(&query.to_string()))
            .await
            .context("embedding query")?;
        let vector = vectors
            .into_iter()
            .next()
            .context("embedding backend returned no vector for the query")?;

        let hits = self
            .store
            .search(&vector, top_k)
            .await
            .context("searching index")?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let payload = hit.payload;
            let text = match payload.text {
                Some(text) => text,
                None => {
                    match self
                        .slice_live_file(&payload.file_path, payload.line_start, payload.line_end)
                        .await
                    {
                        Some(text) => text,
                        None => {
                            debug!(
                                file = %payload.file_path,
                                "dropping hit whose source text is gone"
                            );
                            continue;
                        }
                    }
                }
            };
            results.push(RetrievedChunk {
                file_path: payload.file_path,
                line_start: payload.line_start,
                line_end: payload.line_end,
                score: hit.score,
                text,
            });
        }
        Ok(results)
    }

    /// Re-read the chunk's line range from the file on disk. None when the
    /// file is gone or has shrunk past the range start.
    async fn slice_live_file(
        &self,
        relative_path: &str,
        line_start: usize,
        line_end: usize,
    ) -> Option<String> {
        let content = tokio::fs::read_to_string(self.root.join(relative_path))
            .await
            .ok()?;
        let lines: Vec<&str> = content.lines().collect();
        if line_start == 0 || line_start > lines.len() {
            return None;
        }
        let end = line_end.min(lines.len());
        Some(lines[line_start - 1..end].join("\n"))
    }
}
