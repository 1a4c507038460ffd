//! Error types for the metadata store.

/// Errors produced by [`MetadataStore`](crate::store::MetadataStore)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An operation was attempted before a log replay completed.
    #[error("metadata store has not been initialized")]
    NotInitialized,

    /// The requested object id is unknown, or its backing file has vanished.
    #[error("object does not exist")]
    NotExist,

    /// A live record already occupies the requested path.
    #[error("an object already exists at that path")]
    AlreadyExists,

    /// The log handle was closed by shutdown; mutations are refused.
    #[error("store is shutting down")]
    Exiting,

    /// Replay encountered an undecodable ADD payload or an unknown action.
    #[error("metadata log is corrupt at line {line}: {reason}")]
    Corrupt {
        /// 1-based line number of the offending entry.
        line: usize,
        /// What failed to decode.
        reason: String,
    },

    /// A log entry could not be serialized.
    #[error("failed to encode log entry: {0}")]
    Encode(#[from] serde_json::Error),

    /// Underlying filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
