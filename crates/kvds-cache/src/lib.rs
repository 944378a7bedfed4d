//! Object cache for KVDS.
//!
//! A datastore configured with a cache consults it in place of the backend
//! for reads and mirrors every successful mutation into it. The contract is
//! the [`ObjectCache`] trait; [`KvCache`] is the default implementation,
//! which groups objects by their parent key and fills each group from the
//! backend on first use.

pub mod cache;
pub mod error;
pub mod traits;

pub use cache::KvCache;
pub use error::{CacheError, CacheResult};
pub use traits::ObjectCache;
