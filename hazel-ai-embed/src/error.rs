//! Error types for embedding backends.

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors produced by embedding providers.
///
/// [`EmbedError::Unavailable`] is the terminal case: no backend in the
/// configured chain could produce embeddings. Callers abort the current
/// file or query on it, log, and carry on; it must never take down a
/// watcher loop.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// No embedding backend could be reached or loaded.
    #[error("no embedding backend available")]
    Unavailable,

    /// A backend returned the wrong number of vectors for the input batch.
    #[error("backend '{provider}' returned {got} vectors for {expected} inputs")]
    CountMismatch {
        provider: String,
        expected: usize,
        got: usize,
    },

    /// A backend produced vectors of an unexpected dimension.
    #[error("backend '{provider}' produced dimension {got}, expected {expected}")]
    DimensionMismatch {
        provider: String,
        expected: usize,
        got: usize,
    },

    /// Invalid provider configuration.
    #[error("invalid embedding configuration: {0}")]
    InvalidConfig(String),

    /// HTTP transport failure talking to a remote backend.
    #[error("embedding request failed: {source}")]
    Request {
        #[from]
        source: reqwest::Error,
    },

    /// A blocking embedding task panicked or was cancelled.
    #[error("embedding task failed: {source}")]
    Task {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Failure inside an embedding library.
    #[error("embedding backend error: {source}")]
    Backend {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Convenience constructor for configuration errors.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig(message.into())
    }
}
