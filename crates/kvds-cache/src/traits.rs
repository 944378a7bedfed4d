use async_trait::async_trait;
use kvds_types::KvObject;

use crate::error::CacheResult;

/// Cache collaborator consulted by a datastore.
///
/// When present it fully substitutes the backend for reads: `get` and
/// `list` are answered from the cache, and the datastore calls `add` / `del`
/// to keep it in step with successful writes.
#[async_trait]
pub trait ObjectCache: Send + Sync {
    /// Store a copy of `object`.
    async fn add(&self, object: &dyn KvObject) -> CacheResult<()>;

    /// Copy the cached object at backend key `key` into `into`.
    ///
    /// Fails with a `KeyNotFound` store error on a miss.
    async fn get(&self, key: &str, into: &mut dyn KvObject) -> CacheResult<()>;

    /// Copies of every cached object in `sample`'s collection.
    async fn list(&self, sample: &dyn KvObject) -> CacheResult<Vec<Box<dyn KvObject>>>;

    /// Remove `object` from the cache.
    async fn del(&self, object: &dyn KvObject) -> CacheResult<()>;
}
