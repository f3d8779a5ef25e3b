use thiserror::Error;

/// Main error type for cache engine operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("circuit open for {operation}, retry after {retry_after_ms}ms")]
    CircuitOpen {
        operation: String,
        retry_after_ms: u64,
    },

    #[error("checksum mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    #[error("write failed after {attempts} attempts: {reason}")]
    WriteExhausted { attempts: u32, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

impl CacheError {
    /// Whether the error indicates a rejected call rather than an attempted
    /// one (circuit open). The manager degrades these to cache misses.
    pub fn is_rejection(&self) -> bool {
        matches!(self, CacheError::CircuitOpen { .. })
    }
}

/// Result type alias for cache engine operations
pub type Result<T> = std::result::Result<T, CacheError>;
