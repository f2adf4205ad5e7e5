//! Embedding providers for the hazel indexing pipeline.
//!
//! The core abstraction is [`EmbeddingProvider`]: ordered texts in, ordered
//! fixed-length vectors out, with the output dimension queryable without
//! running an embedding. Three concrete backends are provided:
//!
//! - [`OllamaEmbedder`]: talks to a local Ollama server over HTTP.
//! - [`FastEmbedEmbedder`]: runs an ONNX model in-process via fastembed.
//! - [`HashingEmbedder`]: deterministic feature hashing, for tests and
//!   offline runs.
//!
//! [`FallbackEmbedder`] composes providers into an explicit ordered chain:
//! each backend is tried in turn and the chain only fails with
//! [`EmbedError::Unavailable`] once every backend has failed.
//!
//! All providers L2-normalize their output, so cosine similarity reduces to
//! a dot product downstream.

pub mod error;
pub mod fallback;
pub mod fastembed_provider;
pub mod hashing;
pub mod ollama;
pub mod provider;

pub use error::{EmbedError, Result};
pub use fallback::FallbackEmbedder;
pub use fastembed_provider::FastEmbedEmbedder;
pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;
pub use provider::EmbeddingProvider;
