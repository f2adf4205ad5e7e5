//! Indexing pipeline: full rebuilds, incremental per-file updates, change
//! watching, and similarity retrieval.

pub mod indexer;
pub mod retriever;
pub mod watcher;

pub use indexer::{IndexOutcome, Indexer, RebuildSummary};
pub use retriever::{RetrievedChunk, Retriever};
pub use watcher::{WatchEvent, WatchEventKind, WatchHandle, start_watching};
