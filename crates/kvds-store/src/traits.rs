use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StoreResult;

/// A raw key/value pair together with its backend version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
    /// Store index of the write that produced this value.
    pub last_index: u64,
}

impl KvPair {
    pub fn new(key: impl Into<String>, value: Vec<u8>, last_index: u64) -> Self {
        Self {
            key: key.into(),
            value,
            last_index,
        }
    }

    /// A bare precondition: only the key and the expected index matter.
    pub fn previous(key: impl Into<String>, last_index: u64) -> Self {
        Self::new(key, Vec::new(), last_index)
    }
}

/// Per-write options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Expire the key after this long. `None` keeps it forever.
    pub ttl: Option<Duration>,
}

/// Change notifications for one watched key.
pub type WatchStream = mpsc::UnboundedReceiver<KvPair>;

/// Backend key-value store.
///
/// Implementations must be thread-safe and provide per-key linearizable
/// reads and writes. Indexes handed out by successful writes are strictly
/// increasing. All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a key. Fails with `KeyNotFound` if absent.
    async fn get(&self, key: &str) -> StoreResult<KvPair>;

    /// Unconditionally write a key.
    async fn put(&self, key: &str, value: &[u8], options: Option<&WriteOptions>)
        -> StoreResult<()>;

    /// Unconditionally delete a key. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Every pair whose key starts with `prefix`, ordered by key.
    ///
    /// Fails with `KeyNotFound` if nothing matches.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<KvPair>>;

    /// Delete every key starting with `prefix`.
    async fn delete_tree(&self, prefix: &str) -> StoreResult<()>;

    /// Compare-and-swap write.
    ///
    /// With `previous = None` the key must not exist; otherwise its current
    /// index must equal `previous.last_index`. Returns the stored pair with
    /// its new index.
    async fn atomic_put(
        &self,
        key: &str,
        value: &[u8],
        previous: Option<&KvPair>,
        options: Option<&WriteOptions>,
    ) -> StoreResult<(bool, KvPair)>;

    /// Compare-and-swap delete against `previous.last_index`.
    async fn atomic_delete(&self, key: &str, previous: &KvPair) -> StoreResult<bool>;

    /// Subscribe to changes of a single key.
    ///
    /// The current value, if any, is delivered first. The subscription is
    /// released when `stop` is cancelled or the stream is dropped.
    async fn watch(&self, key: &str, stop: CancellationToken) -> StoreResult<WatchStream>;

    /// Release the backend. Later calls fail with `Closed`.
    fn close(&self);
}
