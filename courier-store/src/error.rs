//! Error types for the message store.

/// Errors from the log, the index, or the record encoding.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A failure inside the key/value log engine.
    #[error("log database error: {0}")]
    Database(String),

    /// A failure inside the full-text index. The log write it followed, if
    /// any, is already committed and is not rolled back.
    #[error("index error: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("record encoding error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

macro_rules! from_redb_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(err: $ty) -> Self {
                    StoreError::Database(err.to_string())
                }
            }
        )*
    };
}

from_redb_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);
