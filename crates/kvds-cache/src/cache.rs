use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use kvds_store::KvStore;
use kvds_types::{key, KvConstructor, KvObject};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::traits::ObjectCache;

/// Cached objects of one collection, keyed by full backend key.
type Group = BTreeMap<String, Box<dyn KvObject>>;

/// Default [`ObjectCache`].
///
/// Objects are grouped by the backend key of their parent collection
/// (`key(object.key_prefix())`). The first access to a collection fills its
/// group from a backend listing of that prefix; entries with an empty
/// payload (collection placeholders) are left out. If two tasks fill the
/// same group concurrently, the first one installed is kept.
///
/// Every operation needs the constructor capability, since the cache holds
/// its own copies of the objects it is given.
pub struct KvCache {
    store: Arc<dyn KvStore>,
    groups: Mutex<HashMap<String, Group>>,
}

impl KvCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Whether an object with backend key `key` is currently cached.
    pub fn contains(&self, key: &str) -> bool {
        self.groups.lock().values().any(|group| group.contains_key(key))
    }

    /// Number of collections loaded so far.
    pub fn group_count(&self) -> usize {
        self.groups.lock().len()
    }

    /// Make sure the group for `sample`'s collection is loaded and return
    /// its prefix key.
    async fn load_group(&self, sample: &dyn KvObject) -> CacheResult<String> {
        let prefix = key(&sample.key_prefix());
        let loaded = self.groups.lock().contains_key(&prefix);
        if loaded {
            return Ok(prefix);
        }

        let ctor = constructor(sample)?;
        let pairs = match self.store.list(&prefix).await {
            Ok(pairs) => pairs,
            Err(e) if e.is_key_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut group = Group::new();
        for pair in pairs {
            if pair.value.is_empty() {
                continue;
            }
            let mut object = ctor.new_object();
            object.set_value(&pair.value)?;
            object.set_index(pair.last_index);
            group.insert(key(&object.key()), object);
        }

        debug!(prefix = %prefix, entries = group.len(), "cache group loaded");
        self.groups.lock().entry(prefix.clone()).or_insert(group);
        Ok(prefix)
    }
}

impl std::fmt::Debug for KvCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvCache")
            .field("groups", &self.group_count())
            .finish()
    }
}

fn constructor(object: &dyn KvObject) -> CacheResult<&dyn KvConstructor> {
    object
        .as_constructor()
        .ok_or_else(|| CacheError::UnsupportedType {
            prefix: key(&object.key_prefix()),
        })
}

#[async_trait]
impl ObjectCache for KvCache {
    async fn add(&self, object: &dyn KvObject) -> CacheResult<()> {
        let prefix = self.load_group(object).await?;

        let ctor = constructor(object)?;
        let mut copy = ctor.new_object();
        ctor.copy_to(copy.as_mut())?;

        self.groups
            .lock()
            .entry(prefix)
            .or_default()
            .insert(key(&object.key()), copy);
        Ok(())
    }

    async fn get(&self, key: &str, into: &mut dyn KvObject) -> CacheResult<()> {
        let prefix = self.load_group(into).await?;

        let groups = self.groups.lock();
        let cached = groups
            .get(&prefix)
            .and_then(|group| group.get(key))
            .ok_or_else(|| CacheError::Store(kvds_store::StoreError::key_not_found(key)))?;
        constructor(cached.as_ref())?.copy_to(into)?;
        Ok(())
    }

    async fn list(&self, sample: &dyn KvObject) -> CacheResult<Vec<Box<dyn KvObject>>> {
        let prefix = self.load_group(sample).await?;

        let groups = self.groups.lock();
        let Some(group) = groups.get(&prefix) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(group.len());
        for cached in group.values() {
            let ctor = constructor(cached.as_ref())?;
            let mut copy = ctor.new_object();
            ctor.copy_to(copy.as_mut())?;
            out.push(copy);
        }
        Ok(out)
    }

    async fn del(&self, object: &dyn KvObject) -> CacheResult<()> {
        let prefix = self.load_group(object).await?;

        if let Some(group) = self.groups.lock().get_mut(&prefix) {
            group.remove(&key(&object.key()));
        }
        Ok(())
    }
}
