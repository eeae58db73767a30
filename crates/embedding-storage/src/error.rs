//! Embedding store errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// The database was opened without one of the embedding column families
    #[error("Missing column family: {0}")]
    ColumnFamilyNotFound(String),

    /// A content hash, model version or stored key is malformed
    #[error("Invalid embedding key: {0}")]
    Key(String),

    /// Row metadata failed to encode or decode
    #[error("Metadata serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
