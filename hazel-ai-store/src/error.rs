//! Error types for vector store backends.

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors produced by vector store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage backend cannot be reached.
    #[error("vector store unavailable: {0}")]
    Unavailable(String),

    /// Qdrant client failure.
    #[error("qdrant error: {0}")]
    Qdrant(#[from] Box<qdrant_client::QdrantError>),
}

impl From<qdrant_client::QdrantError> for StoreError {
    fn from(e: qdrant_client::QdrantError) -> Self {
        Self::Qdrant(Box::new(e))
    }
}
