//! Per-file indexing and full rebuilds.
//!
//! A file's index presence is replaced wholesale on every update: delete
//! all of its points, then insert the fresh set. Point ids are
//! `hash(file_path) + "_" + sequence`, so surviving chunks overwrite in
//! place and the delete sweep catches chunks past the new end of file.
//! Per-file async mutexes serialize updates to the same file while leaving
//! distinct files free to index concurrently.

use crate::config::{FileFilter, IndexConfig};
use anyhow::{Context, Result};
use hazel_ai_chunk::{Chunk, Chunker};
use hazel_ai_embed::EmbeddingProvider;
use hazel_ai_store::{IndexPoint, PointPayload, VectorStore};
use ignore::WalkBuilder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// What happened to a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The file was chunked and its points replaced.
    Indexed { chunks: usize },
    /// The file's points were deleted.
    Removed,
    /// The path was outside the root or not eligible; nothing changed.
    Skipped,
}

/// Aggregate result of a full rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct RebuildSummary {
    pub files_processed: usize,
    pub files_failed: usize,
    pub chunks_indexed: usize,
    pub duration: Duration,
}

pub struct Indexer {
    root: PathBuf,
    config: IndexConfig,
    chunker: Chunker,
    filter: FileFilter,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    file_locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Canonicalize `path`, or, when it (or its whole subtree) no longer
/// exists, canonicalize the deepest existing ancestor and re-append the
/// missing suffix with `.` and `..` folded out lexically. Deleted files
/// must still map to their indexed relative path or their points would be
/// orphaned.
fn resolve_path(path: &Path) -> Option<PathBuf> {
    use std::path::Component;

    if let Ok(resolved) = path.canonicalize() {
        return Some(resolved);
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    let mut ancestor = normalized.as_path();
    while !ancestor.exists() {
        ancestor = ancestor.parent()?;
    }
    let resolved = ancestor.canonicalize().ok()?;
    Some(resolved.join(normalized.strip_prefix(ancestor).ok()?))
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("root", &self.root)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Indexer {
    pub fn new(
        root: &Path,
        config: IndexConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        config.validate()?;
        let root = root
            .canonicalize()
            .with_context(|| format!("resolving index root {}", root.display()))?;
        let filter = config.file_filter(&root)?;
        let chunker = Chunker::new(config.chunk_size, config.overlap);
        Ok(Self {
            root,
            config,
            chunker,
            filter,
            embedder,
            store,
            file_locks: StdMutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create or reconcile the collection against the embedder's dimension.
    pub async fn ensure_schema(&self) -> Result<()> {
        let dimension = self.embedder.dimension();
        timeout(
            self.config.op_timeout(),
            self.store.ensure_collection(dimension),
        )
        .await
        .context("ensure_collection timed out")?
        .context("ensuring collection")?;
        Ok(())
    }

    /// Stable point id for a chunk of a file.
    pub fn point_id(relative_path: &str, sequence: usize) -> String {
        format!(
            "{}_{}",
            blake3::hash(relative_path.as_bytes()).to_hex(),
            sequence
        )
    }

    /// Whether a path is inside the root and passes the glob filter.
    /// Lexical only, so it also answers for deleted files.
    pub(crate) fn is_eligible(&self, path: &Path) -> bool {
        match self.relative_path(path) {
            Some(rel) => self.filter.matches(&self.root.join(rel)),
            None => false,
        }
    }

    /// Root-relative, forward-slashed path, or None when the path escapes
    /// the root. Existing paths resolve symlinks before the containment
    /// check so `root/link/../../etc/passwd` style paths cannot slip
    /// through.
    fn relative_path(&self, path: &Path) -> Option<String> {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let resolved = resolve_path(&abs)?;
        let rel = resolved.strip_prefix(&self.root).ok()?;
        if rel.as_os_str().is_empty() {
            return None;
        }
        Some(rel.to_string_lossy().replace('\\', "/"))
    }

    fn lock_for(&self, relative_path: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.file_locks.lock().unwrap_or_else(|e| e.into_inner());
        // Entries nobody holds anymore would otherwise accumulate one per
        // path ever touched.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(relative_path.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Re-index one file: delete its old points, chunk, embed, insert.
    ///
    /// A file that vanished (or became unreadable) between the event and
    /// the read simply ends up with no index presence. Embedding failures
    /// abort before any insert, so the store never holds a partial chunk
    /// set for a file.
    pub async fn index_file(&self, path: &Path) -> Result<IndexOutcome> {
        let Some(rel) = self.relative_path(path) else {
            trace!(path = %path.display(), "outside index root, ignoring");
            return Ok(IndexOutcome::Skipped);
        };
        let abs = self.root.join(&rel);
        if !self.filter.matches(&abs) {
            return Ok(IndexOutcome::Skipped);
        }

        let lock = self.lock_for(&rel);
        let _guard = lock.lock().await;

        let bytes = match tokio::fs::read(&abs).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(file = %rel, error = %e, "file unreadable, clearing its points");
                self.delete_points(&rel).await?;
                return Ok(IndexOutcome::Removed);
            }
        };

        self.delete_points(&rel).await?;

        let chunks = self.chunker.chunk(&bytes, &rel);
        if chunks.is_empty() {
            return Ok(IndexOutcome::Indexed { chunks: 0 });
        }

        let vectors = self.embed_chunks(&chunks).await?;
        let points: Vec<IndexPoint> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexPoint {
                id: Self::point_id(&rel, chunk.sequence),
                vector,
                payload: PointPayload {
                    file_path: rel.clone(),
                    sequence: chunk.sequence,
                    char_start: chunk.char_start,
                    char_end: chunk.char_end,
                    line_start: chunk.line_start,
                    line_end: chunk.line_end,
                    text: Some(chunk.text.clone()),
                },
            })
            .collect();

        let count = points.len();
        timeout(self.config.op_timeout(), self.store.upsert(points))
            .await
            .context("upsert timed out")?
            .with_context(|| format!("upserting points for {rel}"))?;

        debug!(file = %rel, chunks = count, "indexed");
        Ok(IndexOutcome::Indexed { chunks: count })
    }

    /// Embed every chunk before touching the store, in batches.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let batch_vectors = timeout(self.config.op_timeout(), self.embedder.embed_texts(&texts))
                .await
                .context("embedding timed out")?
                .context("embedding chunk batch")?;
            vectors.extend(batch_vectors);
        }
        Ok(vectors)
    }

    async fn delete_points(&self, relative_path: &str) -> Result<()> {
        timeout(
            self.config.op_timeout(),
            self.store.delete_for_file(relative_path),
        )
        .await
        .context("delete timed out")?
        .with_context(|| format!("deleting points for {relative_path}"))?;
        Ok(())
    }

    /// Drop every point for a file that no longer exists (or should no
    /// longer be indexed).
    pub async fn remove_file(&self, path: &Path) -> Result<IndexOutcome> {
        let Some(rel) = self.relative_path(path) else {
            trace!(path = %path.display(), "outside index root, ignoring");
            return Ok(IndexOutcome::Skipped);
        };

        let lock = self.lock_for(&rel);
        let _guard = lock.lock().await;

        self.delete_points(&rel).await?;
        debug!(file = %rel, "removed from index");
        Ok(IndexOutcome::Removed)
    }

    /// Remove a file, or every file under a directory, from the index.
    pub async fn remove_tree(&self, path: &Path) -> Result<usize> {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        if !abs.is_dir() {
            return match self.remove_file(&abs).await? {
                IndexOutcome::Removed => Ok(1),
                _ => Ok(0),
            };
        }

        let mut removed = 0;
        for entry in WalkBuilder::new(&abs).build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "walk error during remove");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if matches!(self.remove_file(entry.path()).await?, IndexOutcome::Removed) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Walk the root and re-index every eligible file. Individual file
    /// failures are counted and logged, never fatal to the sweep.
    pub async fn rebuild_all(&self) -> Result<RebuildSummary> {
        let start = Instant::now();
        self.ensure_schema().await?;

        let mut summary = RebuildSummary {
            files_processed: 0,
            files_failed: 0,
            chunks_indexed: 0,
            duration: Duration::ZERO,
        };

        for entry in WalkBuilder::new(&self.root).build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "walk error during rebuild");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if !self.filter.matches(path) {
                continue;
            }

            match self.index_file(path).await {
                Ok(IndexOutcome::Indexed { chunks }) => {
                    summary.files_processed += 1;
                    summary.chunks_indexed += chunks;
                }
                Ok(_) => {}
                Err(e) => {
                    summary.files_failed += 1;
                    warn!(file = %path.display(), error = %e, "failed to index file");
                }
            }
        }

        summary.duration = start.elapsed();
        info!(
            files = summary.files_processed,
            failed = summary.files_failed,
            chunks = summary.chunks_indexed,
            elapsed_ms = summary.duration.as_millis() as u64,
            "rebuild complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hazel_ai_embed::HashingEmbedder;
    use hazel_ai_store::MemoryStore;
    use std::fs;
    use tempfile::TempDir;

    fn test_config() -> IndexConfig {
        IndexConfig {
            chunk_size: 10,
            overlap: 2,
            embedding_dimension: 32,
            ..IndexConfig::default()
        }
    }

    fn test_indexer(dir: &TempDir) -> (Arc<Indexer>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(HashingEmbedder::new(32).unwrap());
        let indexer = Indexer::new(dir.path(), test_config(), embedder, store.clone()).unwrap();
        (Arc::new(indexer), store)
    }

    fn write_lines(dir: &TempDir, name: &str, lines: usize) -> PathBuf {
        let path = dir.path().join(name);
        let body: String = (1..=lines).map(|i| format!("line number {i}\n")).collect();
        fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn indexes_a_file_into_overlapping_chunks() {
        let dir = TempDir::new().unwrap();
        let (indexer, store) = test_indexer(&dir);
        let path = write_lines(&dir, "a.txt", 26);

        indexer.ensure_schema().await.unwrap();
        let outcome = indexer.index_file(&path).await.unwrap();

        // Windows start every 8 lines: 1, 9, 17, 25.
        assert_eq!(outcome, IndexOutcome::Indexed { chunks: 4 });
        assert_eq!(store.point_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn reindex_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (indexer, store) = test_indexer(&dir);
        let path = write_lines(&dir, "a.txt", 26);

        indexer.ensure_schema().await.unwrap();
        indexer.index_file(&path).await.unwrap();
        indexer.index_file(&path).await.unwrap();

        assert_eq!(store.point_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn shrinking_a_file_drops_stale_chunks() {
        let dir = TempDir::new().unwrap();
        let (indexer, store) = test_indexer(&dir);
        let path = write_lines(&dir, "a.txt", 26);

        indexer.ensure_schema().await.unwrap();
        indexer.index_file(&path).await.unwrap();
        assert_eq!(store.point_count().await.unwrap(), 4);

        write_lines(&dir, "a.txt", 5);
        let outcome = indexer.index_file(&path).await.unwrap();

        assert_eq!(outcome, IndexOutcome::Indexed { chunks: 1 });
        assert_eq!(store.point_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn paths_outside_the_root_never_touch_the_store() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let (indexer, store) = test_indexer(&dir);
        let path = write_lines(&outside, "evil.txt", 5);

        indexer.ensure_schema().await.unwrap();
        assert_eq!(
            indexer.index_file(&path).await.unwrap(),
            IndexOutcome::Skipped
        );
        assert_eq!(
            indexer.remove_file(&path).await.unwrap(),
            IndexOutcome::Skipped
        );
        assert_eq!(store.point_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ineligible_extension_is_skipped() {
        let dir = TempDir::new().unwrap();
        let (indexer, store) = test_indexer(&dir);
        let path = write_lines(&dir, "image.png", 5);

        indexer.ensure_schema().await.unwrap();
        assert_eq!(
            indexer.index_file(&path).await.unwrap(),
            IndexOutcome::Skipped
        );
        assert_eq!(store.point_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deleted_file_clears_its_points() {
        let dir = TempDir::new().unwrap();
        let (indexer, store) = test_indexer(&dir);
        let path = write_lines(&dir, "a.txt", 26);

        indexer.ensure_schema().await.unwrap();
        indexer.index_file(&path).await.unwrap();
        fs::remove_file(&path).unwrap();

        let outcome = indexer.index_file(&path).await.unwrap();
        assert_eq!(outcome, IndexOutcome::Removed);
        assert_eq!(store.point_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deleting_a_whole_directory_still_clears_points() {
        let dir = TempDir::new().unwrap();
        let (indexer, store) = test_indexer(&dir);
        fs::create_dir(dir.path().join("sub")).unwrap();
        let path = write_lines(&dir, "sub/a.txt", 12);

        indexer.ensure_schema().await.unwrap();
        indexer.index_file(&path).await.unwrap();
        assert_eq!(store.point_count().await.unwrap(), 2);

        // The parent directory is gone too, so the path has no existing
        // ancestor below the root to resolve against.
        fs::remove_dir_all(dir.path().join("sub")).unwrap();
        let outcome = indexer.remove_file(&path).await.unwrap();

        assert_eq!(outcome, IndexOutcome::Removed);
        assert_eq!(store.point_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lock_map_sheds_entries_no_one_holds() {
        let dir = TempDir::new().unwrap();
        let (indexer, _store) = test_indexer(&dir);
        indexer.ensure_schema().await.unwrap();

        for name in ["a.txt", "b.txt", "c.txt"] {
            let path = write_lines(&dir, name, 5);
            indexer.index_file(&path).await.unwrap();
        }

        // Each acquisition evicts the released locks of earlier files.
        let locks = indexer.file_locks.lock().unwrap();
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn rebuild_walks_eligible_files_and_skips_the_rest() {
        let dir = TempDir::new().unwrap();
        let (indexer, store) = test_indexer(&dir);
        write_lines(&dir, "a.txt", 26);
        write_lines(&dir, "b.md", 5);
        write_lines(&dir, "c.png", 5);

        let summary = indexer.rebuild_all().await.unwrap();

        assert_eq!(summary.files_processed, 2);
        assert_eq!(summary.files_failed, 0);
        assert_eq!(summary.chunks_indexed, 5);
        assert_eq!(store.point_count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn remove_tree_clears_a_directory() {
        let dir = TempDir::new().unwrap();
        let (indexer, store) = test_indexer(&dir);
        fs::create_dir(dir.path().join("sub")).unwrap();
        write_lines(&dir, "sub/a.txt", 12);
        write_lines(&dir, "sub/b.txt", 12);
        write_lines(&dir, "top.txt", 12);

        indexer.rebuild_all().await.unwrap();
        let before = store.point_count().await.unwrap();
        assert!(before > 0);

        let removed = indexer.remove_tree(&dir.path().join("sub")).await.unwrap();
        assert_eq!(removed, 2);

        let hits = store.search(&[0.0; 32], 100).await.unwrap();
        assert!(hits.iter().all(|h| h.payload.file_path == "top.txt"));
    }

    #[test]
    fn point_ids_are_stable_per_file_and_sequence() {
        let a0 = Indexer::point_id("src/a.rs", 0);
        assert_eq!(a0, Indexer::point_id("src/a.rs", 0));
        assert_ne!(a0, Indexer::point_id("src/a.rs", 1));
        assert_ne!(a0, Indexer::point_id("src/b.rs", 0));
        assert!(a0.ends_with("_0"));
    }
}
