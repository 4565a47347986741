use thiserror::Error;

/// Errors produced by the serial queue itself.
///
/// Operation errors never show up here: they reach the caller untouched.
/// This type only enters the caller's error type through `From<QueueError>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The operation was discarded by `SerialWriteQueue::clear` before it ran.
    #[error("operation discarded: queue was cleared before it ran")]
    Cleared,

    /// The operation panicked (or its runtime shut down) before it settled.
    #[error("operation aborted before it settled (panic or runtime shutdown)")]
    Panicked,
}

/// Errors returned by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
