use thiserror::Error;

/// Errors produced by object and key operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// A backend key does not live under the KVDS root namespace.
    #[error("invalid key: {key}")]
    InvalidKey { key: String },

    /// A stored payload could not be decoded into the target object.
    #[error("decode error: {0}")]
    Decode(String),

    /// The object has no payload where one is required.
    #[error("object at {key} has no value")]
    MissingValue { key: String },

    /// A scope name is neither `local` nor `global`.
    #[error("unknown data scope: {0}")]
    UnknownScope(String),
}
