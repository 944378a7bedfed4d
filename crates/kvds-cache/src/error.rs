use kvds_store::StoreError;
use kvds_types::TypeError;

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The object does not provide the constructor capability.
    #[error("object of collection {prefix} does not implement KvConstructor")]
    UnsupportedType { prefix: String },

    /// Backend failure while filling a group, or a cache miss
    /// (`StoreError::KeyNotFound`).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A payload could not be decoded or copied.
    #[error(transparent)]
    Object(#[from] TypeError),
}

impl CacheError {
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_key_not_found())
    }
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
