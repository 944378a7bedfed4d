use std::path::PathBuf;

/// Errors from backend store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The key does not exist (plain read, list, or atomic precondition).
    #[error("key not found in store: {key}")]
    KeyNotFound { key: String },

    /// An atomic operation observed a different index than expected.
    #[error("unable to complete atomic operation, key modified: {key}")]
    KeyModified { key: String },

    /// The requested provider kind is not registered.
    #[error("backend storage not supported: {0}")]
    UnsupportedBackend(String),

    /// The backend does not implement the requested call.
    #[error("backend does not support {0}")]
    CallNotSupported(&'static str),

    /// The address is unusable for this backend.
    #[error("invalid backend address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The journal file is unreadable beyond torn-write recovery.
    #[error("corrupt journal {path}: {reason}")]
    CorruptJournal { path: PathBuf, reason: String },

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    pub fn key_modified(key: impl Into<String>) -> Self {
        Self::KeyModified { key: key.into() }
    }

    /// `true` for [`StoreError::KeyNotFound`].
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }

    /// `true` for [`StoreError::KeyModified`].
    pub fn is_key_modified(&self) -> bool {
        matches!(self, Self::KeyModified { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
