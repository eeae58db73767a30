//! Storage layer for the embedding cache.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for vector blobs, row metadata and the
//!   per-version index
//! - Keys scoped by (content hash, model version)
//! - Atomic upserts and deletes via WriteBatch

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{EmbeddingRecord, EmbeddingRow, Storage, StorageStats};
pub use error::StorageError;
pub use keys::{EmbeddingKey, VersionIndexKey};
