//! Backend provider table.
//!
//! A provider kind (`"memory"`, `"file"`, or anything registered by the
//! embedding application) names a [`BackendFactory`] that turns an address
//! and [`StoreOptions`] into a live [`KvStore`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::file::FileStore;
use crate::memory::InMemoryStore;
use crate::traits::KvStore;

/// Provider kind of the built-in in-memory backend.
pub const MEMORY_PROVIDER: &str = "memory";
/// Provider kind of the built-in file backend.
pub const FILE_PROVIDER: &str = "file";

/// Backend-specific connection options.
///
/// The built-in `memory` and `file` providers ignore every field; they exist
/// for registered backends that talk to remote servers.
///
/// Part of the scope configuration, so it is hashable and compares by value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Bucket or namespace inside the backend, where supported.
    pub bucket: Option<String>,
    /// Connection timeout in milliseconds.
    pub connection_timeout_ms: Option<u64>,
    /// Keep the underlying connection open between operations.
    pub persist_connection: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Free-form options understood by specific providers.
    pub extra: BTreeMap<String, String>,
}

/// Creates backend connections for one provider kind.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn connect(&self, address: &str, options: &StoreOptions) -> StoreResult<Arc<dyn KvStore>>;
}

/// Factory for [`InMemoryStore`]. The address is ignored.
#[derive(Debug, Default)]
pub struct MemoryFactory;

#[async_trait]
impl BackendFactory for MemoryFactory {
    async fn connect(&self, _address: &str, _options: &StoreOptions) -> StoreResult<Arc<dyn KvStore>> {
        Ok(Arc::new(InMemoryStore::new()))
    }
}

/// Factory for [`FileStore`]. The address is the journal path.
#[derive(Debug, Default)]
pub struct FileFactory;

#[async_trait]
impl BackendFactory for FileFactory {
    async fn connect(&self, address: &str, _options: &StoreOptions) -> StoreResult<Arc<dyn KvStore>> {
        let path = address.to_string();
        let store = tokio::task::spawn_blocking(move || FileStore::open(path))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;
        Ok(Arc::new(store))
    }
}

/// Table of registered provider kinds.
#[derive(Clone, Default)]
pub struct Providers {
    factories: HashMap<String, Arc<dyn BackendFactory>>,
}

impl Providers {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with the built-in `memory` and `file` providers.
    pub fn builtin() -> Self {
        let mut providers = Self::new();
        providers.register(MEMORY_PROVIDER, Arc::new(MemoryFactory));
        providers.register(FILE_PROVIDER, Arc::new(FileFactory));
        providers
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, factory: Arc<dyn BackendFactory>) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Connect to `address` with the factory registered for `kind`.
    pub async fn connect(
        &self,
        kind: &str,
        address: &str,
        options: &StoreOptions,
    ) -> StoreResult<Arc<dyn KvStore>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| StoreError::UnsupportedBackend(kind.to_string()))?;
        debug!(provider = kind, address, "connecting backend");
        factory.connect(address, options).await
    }
}

impl fmt::Debug for Providers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Providers").field("kinds", &self.kinds()).finish()
    }
}
