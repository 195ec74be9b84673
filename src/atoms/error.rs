// ── omem Atoms: Error Types ─────────────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (input, storage, provider…).
//   • The `#[from]` attribute wires std/external error conversions.
//   • Read-side failures never panic the engine: callers downgrade them to
//     empty results with a log line.

use thiserror::Error;

// ── Primary error enum ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MemoryError {
    /// A component was used before `Engine::initialize` wired it.
    #[error("memory engine not initialized")]
    NotInitialized,

    /// Caller-supplied input is unusable (empty text, empty query vector,
    /// missing relation endpoint, …).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The embedder or generator failed; the operation proceeds with a
    /// degraded view wherever possible.
    #[error("dependency failure: {provider}: {message}")]
    Dependency { provider: String, message: String },

    /// SQLite / rusqlite database failure.
    #[error("storage failure: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request-scoped deadline or cancellation fired.
    #[error("operation cancelled")]
    Cancelled,

    /// In-flight background work did not drain within the close deadline.
    #[error("shutdown timed out after {0} seconds")]
    ShutdownTimeout(u64),

    /// Engine configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

// ── Convenience constructors ────────────────────────────────────────────────

impl MemoryError {
    /// Create a dependency error with provider name and message.
    pub fn dependency(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dependency {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-input error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

// ── Convenience alias ───────────────────────────────────────────────────────

/// All engine operations return this type.
pub type MemoryResult<T> = Result<T, MemoryError>;
