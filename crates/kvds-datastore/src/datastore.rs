use std::sync::Arc;

use async_trait::async_trait;
use kvds_cache::{KvCache, ObjectCache};
use kvds_store::{KvPair, KvStore};
use kvds_types::{key, DataScope, KvConstructor, KvObject};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{DataStoreError, DataStoreResult};
use crate::registry::Lease;
use crate::watch::{spawn_forwarder, ObjectStream};

/// Object access over one shared backend.
///
/// Objects are stored at `key(object.key())`. When a cache is configured it
/// answers every read and mirrors every successful write. Errors from the
/// backend and the cache are returned as they are; nothing is retried.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Read the object at backend key `key` into `into`, setting its index.
    async fn get(&self, key: &str, into: &mut dyn KvObject) -> DataStoreResult<()>;

    /// Unconditional write. Skip objects only reach the cache.
    async fn put(&self, object: &dyn KvObject) -> DataStoreResult<()>;

    /// Compare-and-swap write.
    ///
    /// An object that [`exists`](KvObject::exists) must still be at its
    /// index; one that does not must not be stored yet. On success the new
    /// index is written back into `object`.
    async fn put_atomic(&self, object: &mut dyn KvObject) -> DataStoreResult<()>;

    /// Unconditional delete. The cache entry is evicted first.
    async fn delete(&self, object: &dyn KvObject) -> DataStoreResult<()>;

    /// Delete guarded by the object's index. The cache entry is evicted only
    /// once the backend delete went through.
    async fn delete_atomic(&self, object: &dyn KvObject) -> DataStoreResult<()>;

    /// Delete everything under the object's parent key.
    async fn delete_tree(&self, object: &dyn KvObject) -> DataStoreResult<()>;

    /// Every object stored under `key`, built from `sample`'s type.
    async fn list(&self, key: &str, sample: &dyn KvObject) -> DataStoreResult<Vec<Box<dyn KvObject>>>;

    /// Typed change notifications for `object`'s key until `cancel` fires.
    async fn watch(&self, object: &dyn KvObject, cancel: CancellationToken) -> DataStoreResult<ObjectStream>;

    /// Whether this store delivers change notifications.
    fn watchable(&self) -> bool;

    fn scope(&self) -> DataScope;

    /// The shared backend handle.
    fn kv_store(&self) -> Arc<dyn KvStore>;

    /// Give this facade's reference back to the registry. Also happens on
    /// drop; calling it more than once has no further effect.
    fn close(&self);
}

/// [`DataStore`] handed out by the [`StoreRegistry`](crate::StoreRegistry).
pub struct KvDataStore {
    scope: DataScope,
    embedded: bool,
    store: Arc<dyn KvStore>,
    cache: Option<Arc<KvCache>>,
    lease: Lease,
}

impl KvDataStore {
    pub(crate) fn new(
        scope: DataScope,
        embedded: bool,
        store: Arc<dyn KvStore>,
        cache: Option<Arc<KvCache>>,
        lease: Lease,
    ) -> Self {
        Self {
            scope,
            embedded,
            store,
            cache,
            lease,
        }
    }

    /// The object cache, present for local-scope stores.
    pub fn cache(&self) -> Option<&Arc<KvCache>> {
        self.cache.as_ref()
    }

    /// Create the collection key with an empty payload if it is absent.
    async fn ensure_key(&self, key: &str) -> DataStoreResult<()> {
        if self.store.exists(key).await? {
            return Ok(());
        }
        debug!(key, "creating collection placeholder");
        self.store.put(key, &[], None).await?;
        Ok(())
    }
}

impl std::fmt::Debug for KvDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvDataStore")
            .field("scope", &self.scope)
            .field("embedded", &self.embedded)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

fn payload(object: &dyn KvObject) -> DataStoreResult<Vec<u8>> {
    object.value().ok_or_else(|| {
        DataStoreError::InvalidArgument(format!(
            "invalid KV object with a nil value for key {}",
            key(&object.key())
        ))
    })
}

fn constructor<'a>(
    object: &'a dyn KvObject,
    operation: &'static str,
) -> DataStoreResult<&'a dyn KvConstructor> {
    object
        .as_constructor()
        .ok_or(DataStoreError::UnsupportedType { operation })
}

#[async_trait]
impl DataStore for KvDataStore {
    async fn get(&self, key: &str, into: &mut dyn KvObject) -> DataStoreResult<()> {
        if let Some(cache) = &self.cache {
            cache.get(key, into).await?;
            return Ok(());
        }

        let pair = self.store.get(key).await?;
        into.set_value(&pair.value)?;
        into.set_index(pair.last_index);
        Ok(())
    }

    async fn put(&self, object: &dyn KvObject) -> DataStoreResult<()> {
        let value = payload(object)?;

        if !object.skip() {
            self.store.put(&key(&object.key()), &value, None).await?;
        }

        if let Some(cache) = &self.cache {
            cache.add(object).await?;
        }
        Ok(())
    }

    async fn put_atomic(&self, object: &mut dyn KvObject) -> DataStoreResult<()> {
        let value = payload(object)?;

        if !object.skip() {
            let key = key(&object.key());
            let previous = object
                .exists()
                .then(|| KvPair::previous(key.as_str(), object.index()));
            let (_, pair) = self
                .store
                .atomic_put(&key, &value, previous.as_ref(), None)
                .await?;
            object.set_index(pair.last_index);
        }

        if let Some(cache) = &self.cache {
            cache.add(object).await?;
        }
        Ok(())
    }

    async fn delete(&self, object: &dyn KvObject) -> DataStoreResult<()> {
        if let Some(cache) = &self.cache {
            cache.del(object).await?;
        }

        if object.skip() {
            return Ok(());
        }
        self.store.delete(&key(&object.key())).await?;
        Ok(())
    }

    async fn delete_atomic(&self, object: &dyn KvObject) -> DataStoreResult<()> {
        if !object.skip() {
            let key = key(&object.key());
            let previous = KvPair::previous(key.as_str(), object.index());
            self.store.atomic_delete(&key, &previous).await?;
        }

        if let Some(cache) = &self.cache {
            cache.del(object).await?;
        }
        Ok(())
    }

    async fn delete_tree(&self, object: &dyn KvObject) -> DataStoreResult<()> {
        if let Some(cache) = &self.cache {
            cache.del(object).await?;
        }

        if object.skip() {
            return Ok(());
        }
        self.store.delete_tree(&key(&object.key_prefix())).await?;
        Ok(())
    }

    async fn list(&self, key: &str, sample: &dyn KvObject) -> DataStoreResult<Vec<Box<dyn KvObject>>> {
        let ctor = constructor(sample, "list")?;

        if let Some(cache) = &self.cache {
            return Ok(cache.list(sample).await?);
        }

        self.ensure_key(key).await?;
        let pairs = self.store.list(key).await?;

        let mut objects = Vec::with_capacity(pairs.len());
        for pair in pairs {
            if pair.value.is_empty() {
                continue;
            }
            let mut object = ctor.new_object();
            object.set_value(&pair.value)?;
            object.set_index(pair.last_index);
            objects.push(object);
        }
        Ok(objects)
    }

    async fn watch(&self, object: &dyn KvObject, cancel: CancellationToken) -> DataStoreResult<ObjectStream> {
        let template = constructor(object, "watch")?.new_object();
        if template.as_constructor().is_none() {
            return Err(DataStoreError::UnsupportedType { operation: "watch" });
        }

        let key = key(&object.key());
        let backend_stop = cancel.child_token();
        let raw = self.store.watch(&key, backend_stop.clone()).await?;
        Ok(spawn_forwarder(key, template, raw, cancel, backend_stop))
    }

    fn watchable(&self) -> bool {
        self.scope.is_watchable() && !self.embedded
    }

    fn scope(&self) -> DataScope {
        self.scope
    }

    fn kv_store(&self) -> Arc<dyn KvStore> {
        Arc::clone(&self.store)
    }

    fn close(&self) {
        self.lease.release();
    }
}
