use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::journal::{Journal, JournalRecord};
use crate::traits::{KvPair, KvStore, WatchStream, WriteOptions};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn expiry(options: Option<&WriteOptions>) -> Option<u64> {
    options
        .and_then(|o| o.ttl)
        .map(|ttl| now_ms().saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)))
}

struct Entry {
    value: Vec<u8>,
    last_index: u64,
    expires_at_ms: Option<u64>,
}

impl Entry {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at_ms.map_or(true, |at| at > now)
    }
}

/// A registered change subscription on one key.
struct Watcher {
    id: u64,
    key: String,
    sender: mpsc::UnboundedSender<KvPair>,
}

struct State {
    entries: BTreeMap<String, Entry>,
    /// Highest index handed out so far.
    index: u64,
    watchers: Vec<Watcher>,
    next_watch_id: u64,
    closed: bool,
}

impl State {
    fn live(&self, key: &str, now: u64) -> Option<&Entry> {
        self.entries.get(key).filter(|e| e.is_live(now))
    }

    fn apply(&mut self, record: JournalRecord) {
        match record {
            JournalRecord::Put {
                key,
                value,
                index,
                expires_at_ms,
            } => {
                self.index = self.index.max(index);
                let pair = KvPair::new(key.clone(), value.clone(), index);
                self.entries.insert(
                    key,
                    Entry {
                        value,
                        last_index: index,
                        expires_at_ms,
                    },
                );
                self.route(&pair);
            }
            JournalRecord::Delete { key } => {
                self.entries.remove(&key);
            }
            JournalRecord::DeleteTree { prefix } => {
                self.entries.retain(|k, _| !k.starts_with(&prefix));
            }
            JournalRecord::Index { index } => {
                self.index = self.index.max(index);
            }
        }
    }

    /// Deliver a change to every watcher of its key, pruning dead ones.
    fn route(&mut self, pair: &KvPair) {
        self.watchers.retain(|w| {
            if w.key == pair.key {
                w.sender.send(pair.clone()).is_ok()
            } else {
                !w.sender.is_closed()
            }
        });
    }
}

struct Shared {
    state: Mutex<State>,
    journal: Option<Journal>,
    shutdown: CancellationToken,
}

/// In-memory, versioned key-value store.
///
/// Every write takes the next value of a store-wide index, which becomes the
/// key's `last_index`. Watches are fanned out from the write path. When
/// created through [`FileStore`](crate::FileStore) every mutation is also
/// appended to a journal before it is applied.
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::build(None, Vec::new())
    }

    /// Create a store whose mutations are journaled, seeded by replaying
    /// `records`.
    pub(crate) fn with_journal(journal: Journal, records: Vec<JournalRecord>) -> Self {
        Self::build(Some(journal), records)
    }

    fn build(journal: Option<Journal>, records: Vec<JournalRecord>) -> Self {
        let mut state = State {
            entries: BTreeMap::new(),
            index: 0,
            watchers: Vec::new(),
            next_watch_id: 1,
            closed: false,
        };
        for record in records {
            state.apply(record);
        }
        let now = now_ms();
        state.entries.retain(|_, e| e.is_live(now));

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                journal,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = now_ms();
        let state = self.shared.state.lock();
        state.entries.values().filter(|e| e.is_live(now)).count()
    }

    /// Returns `true` if no live key exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest index handed out so far.
    pub fn current_index(&self) -> u64 {
        self.shared.state.lock().index
    }

    /// Number of active watch subscriptions.
    pub fn watcher_count(&self) -> usize {
        self.shared.state.lock().watchers.len()
    }

    /// Rewrite the journal to hold only live entries, headed by the current
    /// index so reopened stores never hand out an index twice. No-op without
    /// a journal.
    pub fn compact(&self) -> StoreResult<()> {
        let Some(journal) = &self.shared.journal else {
            return Ok(());
        };
        let now = now_ms();
        let state = self.open_state()?;
        let mut records = vec![JournalRecord::Index { index: state.index }];
        records.extend(
            state
                .entries
                .iter()
                .filter(|(_, e)| e.is_live(now))
                .map(|(key, e)| JournalRecord::Put {
                    key: key.clone(),
                    value: e.value.clone(),
                    index: e.last_index,
                    expires_at_ms: e.expires_at_ms,
                }),
        );
        journal.rewrite(&records)?;
        info!(entries = records.len() - 1, index = state.index, "journal compacted");
        Ok(())
    }

    fn open_state(&self) -> StoreResult<MutexGuard<'_, State>> {
        let state = self.shared.state.lock();
        if state.closed {
            return Err(StoreError::Closed);
        }
        Ok(state)
    }

    /// Journal then apply a mutation. Expired entries are dropped first.
    fn commit(&self, state: &mut State, record: JournalRecord) -> StoreResult<()> {
        if let Some(journal) = &self.shared.journal {
            journal.append(&record)?;
        }
        let now = now_ms();
        state.entries.retain(|_, e| e.is_live(now));
        state.apply(record);
        Ok(())
    }

    fn write(
        &self,
        state: &mut State,
        key: &str,
        value: &[u8],
        options: Option<&WriteOptions>,
    ) -> StoreResult<KvPair> {
        let index = state.index + 1;
        self.commit(
            state,
            JournalRecord::Put {
                key: key.to_string(),
                value: value.to_vec(),
                index,
                expires_at_ms: expiry(options),
            },
        )?;
        Ok(KvPair::new(key, value.to_vec(), index))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("InMemoryStore")
            .field("key_count", &state.entries.len())
            .field("index", &state.index)
            .field("watchers", &state.watchers.len())
            .field("journaled", &self.shared.journal.is_some())
            .finish()
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<KvPair> {
        let state = self.open_state()?;
        state
            .live(key, now_ms())
            .map(|e| KvPair::new(key, e.value.clone(), e.last_index))
            .ok_or_else(|| StoreError::key_not_found(key))
    }

    async fn put(
        &self,
        key: &str,
        value: &[u8],
        options: Option<&WriteOptions>,
    ) -> StoreResult<()> {
        let mut state = self.open_state()?;
        let pair = self.write(&mut state, key, value, options)?;
        debug!(key, index = pair.last_index, "put");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut state = self.open_state()?;
        if state.entries.contains_key(key) {
            self.commit(&mut state, JournalRecord::Delete { key: key.to_string() })?;
            debug!(key, "delete");
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let state = self.open_state()?;
        Ok(state.live(key, now_ms()).is_some())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<KvPair>> {
        let now = now_ms();
        let state = self.open_state()?;
        let pairs: Vec<KvPair> = state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, e)| KvPair::new(k.clone(), e.value.clone(), e.last_index))
            .collect();
        if pairs.is_empty() {
            return Err(StoreError::key_not_found(prefix));
        }
        Ok(pairs)
    }

    async fn delete_tree(&self, prefix: &str) -> StoreResult<()> {
        let mut state = self.open_state()?;
        self.commit(
            &mut state,
            JournalRecord::DeleteTree {
                prefix: prefix.to_string(),
            },
        )?;
        debug!(prefix, "delete tree");
        Ok(())
    }

    async fn atomic_put(
        &self,
        key: &str,
        value: &[u8],
        previous: Option<&KvPair>,
        options: Option<&WriteOptions>,
    ) -> StoreResult<(bool, KvPair)> {
        let mut state = self.open_state()?;
        let current = state.live(key, now_ms()).map(|e| e.last_index);

        match (previous, current) {
            (None, Some(_)) => return Err(StoreError::key_modified(key)),
            (Some(_), None) => return Err(StoreError::key_not_found(key)),
            (Some(prev), Some(cur)) if prev.last_index != cur => {
                return Err(StoreError::key_modified(key))
            }
            _ => {}
        }

        let pair = self.write(&mut state, key, value, options)?;
        debug!(key, index = pair.last_index, "atomic put");
        Ok((true, pair))
    }

    async fn atomic_delete(&self, key: &str, previous: &KvPair) -> StoreResult<bool> {
        let mut state = self.open_state()?;
        match state.live(key, now_ms()).map(|e| e.last_index) {
            None => return Err(StoreError::key_not_found(key)),
            Some(cur) if cur != previous.last_index => return Err(StoreError::key_modified(key)),
            Some(_) => {}
        }

        self.commit(&mut state, JournalRecord::Delete { key: key.to_string() })?;
        debug!(key, "atomic delete");
        Ok(true)
    }

    async fn watch(&self, key: &str, stop: CancellationToken) -> StoreResult<WatchStream> {
        let (tx, rx) = mpsc::unbounded_channel();

        let id = {
            let mut state = self.open_state()?;
            if let Some(entry) = state.live(key, now_ms()) {
                let _ = tx.send(KvPair::new(key, entry.value.clone(), entry.last_index));
            }
            let id = state.next_watch_id;
            state.next_watch_id += 1;
            state.watchers.push(Watcher {
                id,
                key: key.to_string(),
                sender: tx.clone(),
            });
            id
        };
        debug!(key, watch_id = id, "watch registered");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::select! {
                _ = stop.cancelled() => {}
                _ = tx.closed() => {}
                _ = shared.shutdown.cancelled() => {}
            }
            shared.state.lock().watchers.retain(|w| w.id != id);
            debug!(watch_id = id, "watch released");
        });

        Ok(rx)
    }

    fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.watchers.clear();
        }
        self.shared.shutdown.cancel();
        if let Some(journal) = &self.shared.journal {
            if let Err(e) = journal.sync() {
                warn!(path = %journal.path().display(), error = %e, "journal sync on close failed");
            }
        }
        info!("store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn put_and_get() {
        let store = InMemoryStore::new();
        store.put("a/", b"one", None).await.unwrap();

        let pair = store.get("a/").await.unwrap();
        assert_eq!(pair.value, b"one");
        assert_eq!(pair.last_index, 1);
    }

    #[tokio::test]
    async fn get_missing_is_key_not_found() {
        let store = InMemoryStore::new();
        let err = store.get("nope/").await.unwrap_err();
        assert!(err.is_key_not_found());
    }

    #[tokio::test]
    async fn indexes_increase_across_keys() {
        let store = InMemoryStore::new();
        store.put("a/", b"1", None).await.unwrap();
        store.put("b/", b"2", None).await.unwrap();
        store.put("a/", b"3", None).await.unwrap();

        assert_eq!(store.get("b/").await.unwrap().last_index, 2);
        assert_eq!(store.get("a/").await.unwrap().last_index, 3);
        assert_eq!(store.current_index(), 3);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryStore::new();
        store.put("a/", b"1", None).await.unwrap();
        store.delete("a/").await.unwrap();
        store.delete("a/").await.unwrap();
        assert!(!store.exists("a/").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn list_by_prefix_in_key_order() {
        let store = InMemoryStore::new();
        store.put("net/b/", b"b", None).await.unwrap();
        store.put("net/a/", b"a", None).await.unwrap();
        store.put("nets/x/", b"x", None).await.unwrap();

        let pairs = store.list("net/").await.unwrap();
        let keys: Vec<&str> = pairs.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["net/a/", "net/b/"]);
    }

    #[tokio::test]
    async fn list_empty_prefix_is_key_not_found() {
        let store = InMemoryStore::new();
        assert!(store.list("net/").await.unwrap_err().is_key_not_found());
    }

    #[tokio::test]
    async fn delete_tree_removes_subtree_only() {
        let store = InMemoryStore::new();
        store.put("net/a/", b"a", None).await.unwrap();
        store.put("net/a/ep/", b"e", None).await.unwrap();
        store.put("other/", b"o", None).await.unwrap();

        store.delete_tree("net/").await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.exists("other/").await.unwrap());
    }

    #[tokio::test]
    async fn atomic_put_create_then_conflict() {
        let store = InMemoryStore::new();
        let (ok, pair) = store.atomic_put("a/", b"v1", None, None).await.unwrap();
        assert!(ok);
        assert_eq!(pair.last_index, 1);

        // A second creator still believes the key is absent.
        let err = store.atomic_put("a/", b"v2", None, None).await.unwrap_err();
        assert!(err.is_key_modified());
    }

    #[tokio::test]
    async fn atomic_put_update_checks_index() {
        let store = InMemoryStore::new();
        let (_, first) = store.atomic_put("a/", b"v1", None, None).await.unwrap();
        let (_, second) = store
            .atomic_put("a/", b"v2", Some(&first), None)
            .await
            .unwrap();
        assert!(second.last_index > first.last_index);

        let err = store
            .atomic_put("a/", b"v3", Some(&first), None)
            .await
            .unwrap_err();
        assert!(err.is_key_modified());
        assert_eq!(store.get("a/").await.unwrap().value, b"v2");
    }

    #[tokio::test]
    async fn atomic_put_update_of_missing_key() {
        let store = InMemoryStore::new();
        let prev = KvPair::previous("a/", 4);
        let err = store
            .atomic_put("a/", b"v", Some(&prev), None)
            .await
            .unwrap_err();
        assert!(err.is_key_not_found());
    }

    #[tokio::test]
    async fn atomic_delete_checks_index() {
        let store = InMemoryStore::new();
        let (_, pair) = store.atomic_put("a/", b"v1", None, None).await.unwrap();

        let stale = KvPair::previous("a/", pair.last_index + 10);
        assert!(store.atomic_delete("a/", &stale).await.unwrap_err().is_key_modified());

        assert!(store.atomic_delete("a/", &pair).await.unwrap());
        assert!(store.atomic_delete("a/", &pair).await.unwrap_err().is_key_not_found());
    }

    #[tokio::test]
    async fn ttl_expires_entries() {
        let store = InMemoryStore::new();
        let opts = WriteOptions {
            ttl: Some(Duration::from_millis(20)),
        };
        store.put("a/", b"1", Some(&opts)).await.unwrap();
        assert!(store.exists("a/").await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.exists("a/").await.unwrap());
        assert!(store.get("a/").await.unwrap_err().is_key_not_found());
    }

    #[tokio::test]
    async fn huge_ttl_saturates_instead_of_expiring() {
        let store = InMemoryStore::new();
        let opts = WriteOptions {
            ttl: Some(Duration::MAX),
        };
        store.put("a/", b"1", Some(&opts)).await.unwrap();
        assert!(store.exists("a/").await.unwrap());
        assert_eq!(store.get("a/").await.unwrap().value, b"1");
    }

    #[tokio::test]
    async fn watch_delivers_current_then_updates() {
        let store = InMemoryStore::new();
        store.put("a/", b"v1", None).await.unwrap();

        let stop = CancellationToken::new();
        let mut rx = store.watch("a/", stop.clone()).await.unwrap();
        store.put("b/", b"other", None).await.unwrap();
        store.put("a/", b"v2", None).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().value, b"v1");
        let next = rx.recv().await.unwrap();
        assert_eq!(next.value, b"v2");
        assert_eq!(next.last_index, 3);
        stop.cancel();
    }

    #[tokio::test]
    async fn watch_released_on_stop() {
        let store = InMemoryStore::new();
        let stop = CancellationToken::new();
        let mut rx = store.watch("a/", stop.clone()).await.unwrap();
        assert_eq!(store.watcher_count(), 1);

        stop.cancel();
        // The stream ends once the subscription is gone.
        let ended = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert!(ended.is_none());
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn watch_released_when_receiver_dropped() {
        let store = InMemoryStore::new();
        let rx = store.watch("a/", CancellationToken::new()).await.unwrap();
        drop(rx);

        for _ in 0..50 {
            if store.watcher_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn closed_store_rejects_calls() {
        let store = InMemoryStore::new();
        let mut rx = store.watch("a/", CancellationToken::new()).await.unwrap();
        store.close();
        store.close();

        assert!(matches!(store.get("a/").await, Err(StoreError::Closed)));
        assert!(matches!(store.put("a/", b"x", None).await, Err(StoreError::Closed)));
        let ended = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert!(ended.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creators_have_one_winner() {
        let store = Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..8u8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.atomic_put("race/", &[i], None, None).await.is_ok()
            }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
