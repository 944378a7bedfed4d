//! Backend key-value stores for KVDS.
//!
//! The datastore layer never talks to a concrete backend directly; it
//! consumes the [`KvStore`] capability set defined here. A backend provides
//! linearizable get/put/delete, prefix listing, compare-and-swap on a
//! monotonically increasing per-key index, and optionally change streams.
//!
//! # Backends
//!
//! - [`InMemoryStore`] -- versioned in-process store with watch support
//! - [`FileStore`] -- the in-memory engine made durable by an append-only
//!   journal; embedded use only, no watch support
//!
//! Backends are created by name through [`Providers`], which maps a
//! provider kind (`"memory"`, `"file"`, ...) to a [`BackendFactory`].
//!
//! # Design Rules
//!
//! 1. Every successful write advances the store-wide index; the new value is
//!    the key's `last_index`.
//! 2. Atomic operations compare against `last_index` and fail with
//!    [`StoreError::KeyModified`] or [`StoreError::KeyNotFound`].
//! 3. Listing a prefix with no entries fails with `KeyNotFound`.
//! 4. Watch subscriptions are released as soon as the stop token fires or
//!    the receiver is dropped.

pub mod error;
pub mod file;
pub mod journal;
pub mod memory;
pub mod provider;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use provider::{
    BackendFactory, FileFactory, MemoryFactory, Providers, StoreOptions, FILE_PROVIDER, MEMORY_PROVIDER,
};
pub use traits::{KvPair, KvStore, WatchStream, WriteOptions};
