//! Scope configuration.
//!
//! A [`ScopeCfg`] identifies one backend configuration. It is also the
//! registry key: two facades whose configurations compare equal share a
//! single backend connection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kvds_store::{StoreOptions, FILE_PROVIDER};
use kvds_types::DataScope;
use serde::{Deserialize, Serialize};

use crate::error::{DataStoreError, DataStoreResult};

/// Directory used for the local store when no data directory is given.
pub const DEFAULT_DATA_DIR: &str = "/var/lib/kvds";
/// Bucket of the default local store.
pub const DEFAULT_BUCKET: &str = "kvds";
const LOCAL_KV_FILE: &str = "local-kv.db";
const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 60_000;

/// Backend configuration of one scope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeCfg {
    /// Embedded (file-backed, in-process) rather than a networked client.
    pub embedded: bool,
    pub client: ScopeClientCfg,
}

/// Client parameters of a scope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeClientCfg {
    /// Provider kind, e.g. `"file"` or `"memory"`.
    pub provider: String,
    pub address: String,
    pub options: StoreOptions,
}

impl ScopeCfg {
    pub fn new(provider: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            embedded: false,
            client: ScopeClientCfg {
                provider: provider.into(),
                address: address.into(),
                options: StoreOptions::default(),
            },
        }
    }

    pub fn embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }

    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.client.options = options;
        self
    }

    /// Both provider and address are non-blank.
    pub fn is_valid(&self) -> bool {
        !self.client.provider.trim().is_empty() && !self.client.address.trim().is_empty()
    }

    pub(crate) fn validate(&self, scope: DataScope) -> DataStoreResult<()> {
        if self.client.provider.trim().is_empty() {
            return Err(DataStoreError::InvalidConfig {
                scope,
                reason: "provider is empty".into(),
            });
        }
        if self.client.address.trim().is_empty() {
            return Err(DataStoreError::InvalidConfig {
                scope,
                reason: "address is empty".into(),
            });
        }
        Ok(())
    }
}

/// Configuration of every scope, as loaded from TOML.
///
/// ```toml
/// [local]
/// embedded = true
///
/// [local.client]
/// provider = "file"
/// address = "/var/lib/kvds/network/files/local-kv.db"
///
/// [local.client.options]
/// bucket = "kvds"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopesConfig {
    scopes: BTreeMap<String, ScopeCfg>,
}

impl ScopesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(s: &str) -> DataStoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| DataStoreError::ConfigParse(e.to_string()))?;
        for name in config.scopes.keys() {
            name.parse::<DataScope>()?;
        }
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> DataStoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DataStoreError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> DataStoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| DataStoreError::ConfigParse(e.to_string()))
    }

    pub fn get(&self, scope: DataScope) -> Option<&ScopeCfg> {
        self.scopes.get(scope.as_str())
    }

    pub fn insert(&mut self, scope: DataScope, cfg: ScopeCfg) -> Option<ScopeCfg> {
        self.scopes.insert(scope.as_str().to_string(), cfg)
    }

    /// Fill scopes missing here from `defaults`.
    pub fn merge_defaults(&mut self, defaults: ScopesConfig) {
        for (name, cfg) in defaults.scopes {
            self.scopes.entry(name).or_insert(cfg);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (DataScope, &ScopeCfg)> {
        self.scopes
            .iter()
            .filter_map(|(name, cfg)| name.parse::<DataScope>().ok().map(|scope| (scope, cfg)))
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

/// Path of the default local store under `data_dir`.
pub fn default_local_address(data_dir: impl AsRef<Path>) -> PathBuf {
    let data_dir = data_dir.as_ref();
    let root = if data_dir.as_os_str().is_empty() {
        Path::new(DEFAULT_DATA_DIR)
    } else {
        data_dir
    };
    root.join("network").join("files").join(LOCAL_KV_FILE)
}

/// Built-in scope table: an embedded file store for the local scope.
///
/// The global scope has no default; it must be configured.
pub fn default_scopes(data_dir: impl AsRef<Path>) -> ScopesConfig {
    let options = StoreOptions {
        bucket: Some(DEFAULT_BUCKET.to_string()),
        connection_timeout_ms: Some(DEFAULT_CONNECTION_TIMEOUT_MS),
        ..Default::default()
    };
    let local = ScopeCfg::new(
        FILE_PROVIDER,
        default_local_address(data_dir).to_string_lossy().into_owned(),
    )
    .embedded(true)
    .with_options(options);

    let mut scopes = ScopesConfig::new();
    scopes.insert(DataScope::Local, local);
    scopes
}
