use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::journal::Journal;
use crate::memory::InMemoryStore;
use crate::traits::{KvPair, KvStore, WatchStream, WriteOptions};

/// Replayed records beyond this many per live key trigger a compaction on
/// open.
const COMPACT_RATIO: usize = 2;
/// Journals shorter than this are never compacted on open.
const COMPACT_MIN_RECORDS: usize = 64;

/// Embedded, file-backed store.
///
/// State is held in an [`InMemoryStore`] and every mutation is appended to a
/// journal at the configured path before it is applied. Reopening the path
/// replays the journal. File stores do not deliver change notifications.
pub struct FileStore {
    inner: InMemoryStore,
    path: PathBuf,
}

impl FileStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() || path.is_dir() {
            return Err(StoreError::InvalidAddress {
                address: path.display().to_string(),
                reason: "file store address must be a file path".into(),
            });
        }

        let (journal, records) = Journal::open(path)?;
        let replayed = records.len();
        let inner = InMemoryStore::with_journal(journal, records);

        let live = inner.len();
        if replayed >= COMPACT_MIN_RECORDS && replayed > live * COMPACT_RATIO {
            inner.compact()?;
        }

        info!(path = %path.display(), replayed, live, "file store opened");
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the journal to contain only live entries.
    pub fn compact(&self) -> StoreResult<()> {
        self.inner.compact()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("key_count", &self.inner.len())
            .finish()
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> StoreResult<KvPair> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        value: &[u8],
        options: Option<&WriteOptions>,
    ) -> StoreResult<()> {
        self.inner.put(key, value, options).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key).await
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<KvPair>> {
        self.inner.list(prefix).await
    }

    async fn delete_tree(&self, prefix: &str) -> StoreResult<()> {
        self.inner.delete_tree(prefix).await
    }

    async fn atomic_put(
        &self,
        key: &str,
        value: &[u8],
        previous: Option<&KvPair>,
        options: Option<&WriteOptions>,
    ) -> StoreResult<(bool, KvPair)> {
        self.inner.atomic_put(key, value, previous, options).await
    }

    async fn atomic_delete(&self, key: &str, previous: &KvPair) -> StoreResult<bool> {
        self.inner.atomic_delete(key, previous).await
    }

    async fn watch(&self, _key: &str, _stop: CancellationToken) -> StoreResult<WatchStream> {
        Err(StoreError::CallNotSupported("watch"))
    }

    fn close(&self) {
        self.inner.close();
    }
}
