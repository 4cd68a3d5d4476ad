//! Error types for store operations.

/// Errors that can occur while reading or writing call data.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The referenced row does not exist.
    #[error("{0} not found")]
    NotFound(String),
}
