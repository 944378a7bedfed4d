//! Foundation types for KVDS.
//!
//! This crate defines the vocabulary shared by every other KVDS crate: the
//! capabilities a record must expose to be stored, the scope a record type
//! belongs to, and the codec mapping key segments onto the backend's flat
//! namespace.
//!
//! # Key Types
//!
//! - [`KvObject`] -- Capability set of any record participating in a store
//! - [`KvConstructor`] -- Extended capability for materialising typed instances
//! - [`DataScope`] -- Local (embedded) or global (shared) store affinity
//! - [`Record`] -- Generic JSON-document record usable without a custom type
//! - [`key()`] / [`parse_key()`] -- Key namespace codec

pub mod error;
pub mod key;
pub mod object;
pub mod record;
pub mod scope;

pub use error::TypeError;
pub use key::{key, parse_key, ROOT_CHAIN};
pub use object::{AsAny, KvConstructor, KvObject};
pub use record::Record;
pub use scope::DataScope;
