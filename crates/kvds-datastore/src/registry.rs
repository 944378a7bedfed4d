//! Process-wide table of shared backend connections.
//!
//! Facades created for equal [`ScopeCfg`] values share one backend. The
//! table lock is held only while looking up or mutating entries; the
//! connect itself runs outside it, once per entry, and its outcome (success
//! or failure) is handed to every caller that waited on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kvds_cache::KvCache;
use kvds_store::{KvStore, Providers, StoreError};
use kvds_types::DataScope;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ScopeCfg;
use crate::datastore::KvDataStore;
use crate::error::{DataStoreError, DataStoreResult};

type ConnectOutcome = Result<Arc<dyn KvStore>, Arc<StoreError>>;

static GLOBAL: Lazy<StoreRegistry> = Lazy::new(|| StoreRegistry::new(Providers::builtin()));

/// Backend state of one table entry.
#[derive(Default)]
struct Slot {
    backend: tokio::sync::OnceCell<ConnectOutcome>,
    cache: once_cell::sync::OnceCell<Arc<KvCache>>,
}

impl Slot {
    fn close(&self) {
        if let Some(Ok(store)) = self.backend.get() {
            store.close();
        }
    }
}

struct Entry {
    refs: usize,
    slot: Arc<Slot>,
}

struct RegistryInner {
    table: Mutex<HashMap<ScopeCfg, Entry>>,
    providers: Providers,
}

/// Reference-counted table of backend connections keyed by configuration.
#[derive(Clone)]
pub struct StoreRegistry {
    inner: Arc<RegistryInner>,
}

impl StoreRegistry {
    /// An isolated registry connecting through `providers`.
    pub fn new(providers: Providers) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                table: Mutex::new(HashMap::new()),
                providers,
            }),
        }
    }

    /// The process registry, created on first use with the built-in
    /// providers.
    pub fn global() -> &'static StoreRegistry {
        &GLOBAL
    }

    pub fn providers(&self) -> &Providers {
        &self.inner.providers
    }

    /// Create a facade for `cfg`, connecting the backend if this is the
    /// first reference to it.
    ///
    /// Local-scope facades share one object cache per backend.
    pub async fn acquire(&self, scope: DataScope, cfg: &ScopeCfg) -> DataStoreResult<KvDataStore> {
        cfg.validate(scope)?;

        // Dropped without being handed to a facade, the lease gives its
        // reference back.
        let lease = self.reserve(cfg);
        let client = &cfg.client;
        let outcome = lease
            .slot
            .backend
            .get_or_init(|| async move {
                info!(provider = %client.provider, address = %client.address, "connecting backend");
                self.inner
                    .providers
                    .connect(&client.provider, &client.address, &client.options)
                    .await
                    .map_err(|e| {
                        warn!(provider = %client.provider, address = %client.address, error = %e, "backend connect failed");
                        Arc::new(e)
                    })
            })
            .await;

        let store = match outcome {
            Ok(store) => Arc::clone(store),
            Err(source) => {
                return Err(DataStoreError::Connect {
                    provider: client.provider.clone(),
                    address: client.address.clone(),
                    source: Arc::clone(source),
                })
            }
        };

        let cache = (scope == DataScope::Local).then(|| {
            Arc::clone(
                lease
                    .slot
                    .cache
                    .get_or_init(|| Arc::new(KvCache::new(Arc::clone(&store)))),
            )
        });

        Ok(KvDataStore::new(scope, cfg.embedded, store, cache, lease))
    }

    fn reserve(&self, cfg: &ScopeCfg) -> Lease {
        let mut table = self.inner.table.lock();
        let entry = table.entry(cfg.clone()).or_insert_with(|| Entry {
            refs: 0,
            slot: Arc::new(Slot::default()),
        });
        entry.refs += 1;
        debug!(provider = %cfg.client.provider, address = %cfg.client.address, refs = entry.refs, "store reference acquired");

        Lease {
            registry: self.clone(),
            cfg: cfg.clone(),
            slot: Arc::clone(&entry.slot),
            released: AtomicBool::new(false),
        }
    }

    fn release(&self, cfg: &ScopeCfg, slot: &Arc<Slot>) {
        {
            let mut table = self.inner.table.lock();
            let Some(entry) = table
                .get_mut(cfg)
                .filter(|entry| Arc::ptr_eq(&entry.slot, slot))
            else {
                debug!(address = %cfg.client.address, "release of a drained store entry");
                return;
            };
            entry.refs -= 1;
            if entry.refs > 0 {
                debug!(address = %cfg.client.address, refs = entry.refs, "store reference released");
                return;
            }
            table.remove(cfg);
        }

        info!(provider = %cfg.client.provider, address = %cfg.client.address, "closing backend");
        slot.close();
    }

    /// Live references to `cfg`'s entry; `0` when there is none.
    pub fn ref_count(&self, cfg: &ScopeCfg) -> usize {
        self.inner.table.lock().get(cfg).map_or(0, |entry| entry.refs)
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.inner.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.table.lock().is_empty()
    }

    /// Close every backend and clear the table.
    ///
    /// Facades still alive afterwards keep their backend handle, which is
    /// closed; releasing them is a no-op.
    pub fn drain(&self) {
        let entries: Vec<(ScopeCfg, Entry)> = self.inner.table.lock().drain().collect();
        for (cfg, entry) in entries {
            info!(address = %cfg.client.address, refs = entry.refs, "draining backend");
            entry.slot.close();
        }
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("entries", &self.len())
            .field("providers", &self.inner.providers)
            .finish()
    }
}

/// One counted reference to a registry entry, given back exactly once.
pub(crate) struct Lease {
    registry: StoreRegistry,
    cfg: ScopeCfg,
    slot: Arc<Slot>,
    released: AtomicBool,
}

impl Lease {
    pub(crate) fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.registry.release(&self.cfg, &self.slot);
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release();
    }
}
