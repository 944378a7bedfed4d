//! Object access layer for KVDS.
//!
//! Applications store records implementing [`KvObject`] through a
//! [`DataStore`]. The layer maps objects onto the key namespace, adds
//! compare-and-swap writes keyed on the backend index, turns backend change
//! notifications into typed object streams, and shares one backend
//! connection between every facade created for the same [`ScopeCfg`].
//!
//! # Key Types
//!
//! - [`StoreRegistry`] -- Reference-counted table of backend connections
//! - [`DataStore`] / [`KvDataStore`] -- Per-caller object access facade
//! - [`ScopeCfg`] / [`ScopesConfig`] -- Backend configuration per scope
//! - [`ObjectStream`] -- Typed watch notifications

pub mod config;
pub mod datastore;
pub mod error;
pub mod registry;
pub mod watch;

pub use config::{default_local_address, default_scopes, ScopeCfg, ScopeClientCfg, ScopesConfig};
pub use datastore::{DataStore, KvDataStore};
pub use error::{DataStoreError, DataStoreResult};
pub use registry::StoreRegistry;
pub use watch::{ObjectStream, WATCH_BUFFER};

pub use kvds_store::{KvPair, KvStore, Providers, StoreError, StoreOptions};
pub use kvds_types::{key, parse_key, DataScope, KvConstructor, KvObject, Record, TypeError};

/// Create a facade for `cfg` through the process registry.
pub async fn new_datastore(scope: DataScope, cfg: &ScopeCfg) -> DataStoreResult<KvDataStore> {
    StoreRegistry::global().acquire(scope, cfg).await
}
