use thiserror::Error;

use crate::sink::SinkError;

/// Error type for model, registry and proxy operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A std lock was poisoned while performing the named operation.
    #[error("model lock poisoned during {0}")]
    LockPoisoned(&'static str),

    /// Lookup miss on `get`, `pop` or `delete`.
    #[error("no item {key} in model {sync_id}")]
    NotFound { sync_id: String, key: String },

    /// The sync id has an empty component.
    #[error("invalid sync id: {0}")]
    InvalidSyncId(String),

    /// The sync id does not match any shape known to the store.
    #[error("sync id shape {0} is not registered")]
    UnknownShape(String),

    /// The model registered under a sync id holds a different record type.
    #[error("model {sync_id} does not hold {expected} items")]
    TypeMismatch { sync_id: String, expected: String },

    /// Records are fixed-shape: fields can change but never disappear.
    #[error("field {field} is not mutable")]
    FieldNotMutable { field: String },

    /// A derived view is already registered under this sync id.
    #[error("a model is already registered as {0}")]
    AlreadyRegistered(String),

    /// The record type does not declare this field.
    #[error("unknown field {field}")]
    UnknownField { field: String },

    /// The render sink refused an event.
    #[error("render sink error: {0}")]
    Sink(#[from] SinkError),
}

impl ModelError {
    pub(crate) fn not_found(sync_id: impl ToString, key: impl ToString) -> Self {
        ModelError::NotFound {
            sync_id: sync_id.to_string(),
            key: key.to_string(),
        }
    }

    /// Whether this is a recoverable lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::NotFound { .. })
    }
}

/// Extension for turning lookup misses into `Ok(None)`.
///
/// ```ignore
/// let room = rooms.get(&key).optional()?;
/// ```
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, ModelError>;
}

impl<T> OptionalExt<T> for Result<T, ModelError> {
    fn optional(self) -> Result<Option<T>, ModelError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}
