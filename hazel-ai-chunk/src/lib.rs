//! Text chunking for the hazel indexing pipeline.
//!
//! This crate turns raw file bytes into overlapping line windows with stable
//! positional metadata. Chunking is deliberately dumb and deterministic:
//! the same bytes always produce the same chunks, so re-indexing a file
//! whose content has not changed overwrites the exact same points.
//!
//! The window unit is a *line*: a [`Chunker`] configured with
//! `chunk_size = 300, overlap = 50` emits windows of up to 300 lines whose
//! starts advance by 250 lines, so consecutive windows share 50 lines.
//! Character offsets into the normalized text come from per-line cumulative
//! byte offsets computed once per file.

pub mod text;

pub use text::{Chunk, Chunker};
