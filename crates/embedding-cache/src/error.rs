//! Cache and cached-embedding error types.

use embedding_model::EmbeddingError;
use embedding_storage::StorageError;
use thiserror::Error;

/// Errors raised by [`crate::EmbeddingCache`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// The persistent store failed. Never retried by the cache.
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    /// A stored blob could not be decoded into a vector
    #[error("Corrupt cache entry {content_hash}: {reason}")]
    Corrupt {
        content_hash: String,
        reason: String,
    },
}

/// Errors raised by [`crate::CachedBatchEmbedder`].
///
/// Displays as the originating error.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error(transparent)]
    Model(#[from] EmbeddingError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<StorageError> for EmbedError {
    fn from(err: StorageError) -> Self {
        EmbedError::Cache(CacheError::Storage(err))
    }
}
