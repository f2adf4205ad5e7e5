//! Incremental semantic index over a directory tree.
//!
//! Files under a configured root are discovered, split into overlapping
//! line windows, embedded, and synced into a vector store. A filesystem
//! watcher keeps the index current as files change, and a retriever maps
//! similarity queries back to source snippets.
//!
//! The embedding and storage backends live behind the ports in
//! `hazel-ai-embed` and `hazel-ai-store`; this crate wires them together.

pub mod config;
pub mod retrieval;

pub use config::IndexConfig;
pub use retrieval::{
    IndexOutcome, Indexer, RebuildSummary, RetrievedChunk, Retriever, WatchEvent, WatchEventKind,
    WatchHandle, start_watching,
};
