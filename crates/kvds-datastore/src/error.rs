use std::path::PathBuf;
use std::sync::Arc;

use kvds_cache::CacheError;
use kvds_store::StoreError;
use kvds_types::{DataScope, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataStoreError {
    #[error("invalid datastore configuration for scope {scope}: {reason}")]
    InvalidConfig { scope: DataScope, reason: String },

    #[error("failed to read configuration {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cannot {operation}: object does not implement KvConstructor")]
    UnsupportedType { operation: &'static str },

    /// Backend connection failed. Every caller waiting on the same
    /// connection attempt receives the same source error.
    #[error("failed to connect {provider} backend at {address}: {source}")]
    Connect {
        provider: String,
        address: String,
        #[source]
        source: Arc<StoreError>,
    },

    #[error("object error: {0}")]
    Object(#[from] TypeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

impl DataStoreError {
    /// An atomic write or delete observed a newer index than the caller's.
    pub fn is_key_modified(&self) -> bool {
        match self {
            Self::Store(e) => e.is_key_modified(),
            Self::Cache(CacheError::Store(e)) => e.is_key_modified(),
            _ => false,
        }
    }

    /// The key is absent, from either the backend or the cache.
    pub fn is_key_not_found(&self) -> bool {
        match self {
            Self::Store(e) => e.is_key_not_found(),
            Self::Cache(e) => e.is_key_not_found(),
            _ => false,
        }
    }
}

pub type DataStoreResult<T> = Result<T, DataStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_see_through_cache_errors() {
        let backend: DataStoreError = StoreError::key_not_found("k/").into();
        let cached: DataStoreError = CacheError::Store(StoreError::key_not_found("k/")).into();
        let modified: DataStoreError = StoreError::key_modified("k/").into();

        assert!(backend.is_key_not_found());
        assert!(cached.is_key_not_found());
        assert!(modified.is_key_modified());
        assert!(!modified.is_key_not_found());
        assert!(!DataStoreError::InvalidArgument("nil".into()).is_key_modified());
    }
}
