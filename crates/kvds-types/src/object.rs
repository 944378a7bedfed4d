//! Object capability traits.
//!
//! A record takes part in a store by implementing [`KvObject`]. Operations
//! that must create fresh instances without static type knowledge (listing,
//! watching, caching) additionally need [`KvConstructor`], which an object
//! advertises by overriding [`KvObject::as_constructor`].

use std::any::Any;

use crate::error::TypeError;
use crate::key::key;
use crate::scope::DataScope;

/// Type-erased access to a concrete object, used for downcasting.
///
/// Blanket-implemented for every `'static` type; implementors of
/// [`KvObject`] never write it by hand.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Capability set of a record stored through a datastore.
pub trait KvObject: AsAny + Send + Sync {
    /// Full path segments identifying this instance.
    fn key(&self) -> Vec<String>;

    /// Path segments of the parent collection, used for listing and
    /// subtree deletion.
    fn key_prefix(&self) -> Vec<String>;

    /// Serialized payload. `None` is invalid for any write.
    fn value(&self) -> Option<Vec<u8>>;

    /// Load state from a stored payload.
    fn set_value(&mut self, value: &[u8]) -> Result<(), TypeError>;

    /// Backend version observed at the last read or write. `0` means the
    /// object was never stored.
    fn index(&self) -> u64;

    fn set_index(&mut self, index: u64);

    /// Whether the object has been stored (assigned a non-zero index).
    fn exists(&self) -> bool {
        self.index() != 0
    }

    fn data_scope(&self) -> DataScope;

    /// When `true` the object is kept in caches but never persisted.
    fn skip(&self) -> bool {
        false
    }

    /// The constructor capability, if this type has one.
    fn as_constructor(&self) -> Option<&dyn KvConstructor> {
        None
    }
}

/// Extended capability: build fresh instances of the implementing type.
pub trait KvConstructor: KvObject {
    /// A new, empty instance of the same concrete type.
    fn new_object(&self) -> Box<dyn KvObject>;

    /// Copy this object's state into `dst`, an instance of the same type.
    ///
    /// The default copies the payload and the index.
    fn copy_to(&self, dst: &mut dyn KvObject) -> Result<(), TypeError> {
        let value = self.value().ok_or_else(|| TypeError::MissingValue {
            key: key(&self.key()),
        })?;
        dst.set_value(&value)?;
        dst.set_index(self.index());
        Ok(())
    }
}

impl dyn KvObject {
    /// Borrow as the concrete type `T`.
    pub fn downcast_ref<T: KvObject>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Convert a boxed object back into its concrete type.
    pub fn downcast<T: KvObject>(self: Box<Self>) -> Option<Box<T>> {
        AsAny::into_any(self).downcast::<T>().ok()
    }
}
