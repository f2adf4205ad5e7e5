//! End-to-end pipeline tests over a temp directory, an in-memory store,
//! and the deterministic hashing embedder.

use async_trait::async_trait;
use hazel_ai_embed::{EmbedError, EmbeddingProvider, HashingEmbedder};
use hazel_ai_index::config::IndexConfig;
use hazel_ai_index::retrieval::{IndexOutcome, Indexer, Retriever};
use hazel_ai_store::{MemoryStore, VectorStore};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

const DIM: usize = 1024;

fn test_config() -> IndexConfig {
    IndexConfig {
        chunk_size: 300,
        overlap: 50,
        embedding_dimension: DIM,
        ..IndexConfig::default()
    }
}

fn pipeline(dir: &TempDir) -> (Arc<Indexer>, Retriever, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let embedder = Arc::new(HashingEmbedder::new(DIM).unwrap());
    let indexer = Arc::new(
        Indexer::new(dir.path(), test_config(), embedder.clone(), store.clone()).unwrap(),
    );
    let retriever = Retriever::new(dir.path(), embedder, store.clone());
    (indexer, retriever, store)
}

/// 600 lines, each with tokens unique to its line number.
fn write_numbered_file(dir: &TempDir, name: &str, lines: usize) -> PathBuf {
    let path = dir.path().join(name);
    let body: String = (1..=lines)
        .map(|i| format!("topic{i} detail{i} marker{i}\n"))
        .collect();
    fs::write(&path, body).unwrap();
    path
}

#[tokio::test]
async fn rebuild_then_retrieve_finds_the_right_lines() {
    let dir = TempDir::new().unwrap();
    let (indexer, retriever, _store) = pipeline(&dir);
    write_numbered_file(&dir, "a.txt", 600);

    let summary = indexer.rebuild_all().await.unwrap();
    assert_eq!(summary.files_processed, 1);
    // Windows start every 250 lines: 1-300, 251-550, 501-600.
    assert_eq!(summary.chunks_indexed, 3);

    // Tokens from lines 590-600 appear only in the last window.
    let query: String = (590..=600)
        .map(|i| format!("topic{i} detail{i} marker{i} "))
        .collect();
    let results = retriever.retrieve(&query, 1).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].file_path, "a.txt");
    assert_eq!(results[0].line_start, 501);
    assert_eq!(results[0].line_end, 600);
    assert!(results[0].text.contains("topic590"));
    assert!(results[0].score > 0.0);
}

#[tokio::test]
async fn edits_are_visible_after_reindex() {
    let dir = TempDir::new().unwrap();
    let (indexer, retriever, _store) = pipeline(&dir);
    let path = dir.path().join("notes.md");
    fs::write(&path, "original subject matter\n").unwrap();

    indexer.rebuild_all().await.unwrap();
    fs::write(&path, "replacement subject matter entirely\n").unwrap();
    indexer.index_file(&path).await.unwrap();

    let results = retriever.retrieve("replacement entirely", 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].text.contains("replacement"));
    assert!(!results[0].text.contains("original"));
}

#[tokio::test]
async fn removed_files_stop_matching() {
    let dir = TempDir::new().unwrap();
    let (indexer, retriever, store) = pipeline(&dir);
    let path = dir.path().join("doomed.txt");
    fs::write(&path, "ephemeral content here\n").unwrap();

    indexer.rebuild_all().await.unwrap();
    assert_eq!(store.point_count().await.unwrap(), 1);

    fs::remove_file(&path).unwrap();
    indexer.remove_file(&path).await.unwrap();

    assert_eq!(store.point_count().await.unwrap(), 0);
    assert!(
        retriever
            .retrieve("ephemeral content", 5)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn move_is_remove_plus_reindex() {
    let dir = TempDir::new().unwrap();
    let (indexer, retriever, store) = pipeline(&dir);
    let old = dir.path().join("old_name.txt");
    let new = dir.path().join("new_name.txt");
    fs::write(&old, "movable feast of words\n").unwrap();

    indexer.rebuild_all().await.unwrap();
    fs::rename(&old, &new).unwrap();
    indexer.remove_file(&old).await.unwrap();
    indexer.index_file(&new).await.unwrap();

    assert_eq!(store.point_count().await.unwrap(), 1);
    let results = retriever.retrieve("movable feast", 1).await.unwrap();
    assert_eq!(results[0].file_path, "new_name.txt");
}

/// Fails on any batch containing the poison marker, otherwise delegates.
struct PoisonEmbedder {
    inner: HashingEmbedder,
}

#[async_trait]
impl EmbeddingProvider for PoisonEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> hazel_ai_embed::Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("POISON")) {
            return Err(EmbedError::Unavailable);
        }
        self.inner.embed_texts(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        "poison"
    }
}

#[tokio::test]
async fn rebuild_counts_failures_and_keeps_going() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let embedder = Arc::new(PoisonEmbedder {
        inner: HashingEmbedder::new(DIM).unwrap(),
    });
    let indexer = Indexer::new(dir.path(), test_config(), embedder, store.clone()).unwrap();

    fs::write(dir.path().join("good.txt"), "perfectly fine text\n").unwrap();
    fs::write(dir.path().join("bad.txt"), "POISON in this one\n").unwrap();

    let summary = indexer.rebuild_all().await.unwrap();

    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.files_failed, 1);
    assert_eq!(store.point_count().await.unwrap(), 1);

    // The failed file aborted before insert: nothing partial in the store.
    let hits = store.search(&[0.0; DIM], 10).await.unwrap();
    assert!(hits.iter().all(|h| h.payload.file_path == "good.txt"));
}

#[tokio::test]
async fn excluded_directories_never_reach_the_index() {
    let dir = TempDir::new().unwrap();
    let (indexer, _retriever, store) = pipeline(&dir);
    fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
    fs::write(
        dir.path().join("node_modules/pkg/index.js"),
        "module.exports = 1;\n",
    )
    .unwrap();
    fs::write(dir.path().join("app.js"), "const x = 1;\n").unwrap();

    indexer.rebuild_all().await.unwrap();

    let hits = store.search(&[0.0; DIM], 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload.file_path, "app.js");

    // Direct events for excluded paths are refused as well.
    let outcome = indexer
        .index_file(&dir.path().join("node_modules/pkg/index.js"))
        .await
        .unwrap();
    assert_eq!(outcome, IndexOutcome::Skipped);
}
