//! RocksDB wrapper for embedding storage.
//!
//! Provides:
//! - Database open with column family setup
//! - Upserts of (blob, metadata, index) as one atomic write batch
//! - Point reads by (content hash, model version)
//! - Bulk deletes by content hash or by model version

use chrono::{DateTime, Utc};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_EMBEDDINGS, CF_EMBEDDING_META, CF_EMBEDDING_VERSIONS,
};
use crate::error::StorageError;
use crate::keys::{EmbeddingKey, VersionIndexKey};

/// Metadata stored alongside each vector blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub model_version: String,
    pub dimensions: usize,
    pub created_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A full row: key, raw vector blob and metadata.
#[derive(Debug, Clone)]
pub struct EmbeddingRow {
    pub key: EmbeddingKey,
    pub blob: Vec<u8>,
    pub record: EmbeddingRecord,
}

/// Main storage interface for cached embeddings
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening embedding storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(2);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    /// Upsert a vector blob for (hash, version).
    ///
    /// Blob, metadata and index entry are written in one batch, so a repeat
    /// store for the same key overwrites rather than duplicates.
    pub fn put_embedding(
        &self,
        key: &EmbeddingKey,
        blob: &[u8],
        dimensions: usize,
    ) -> Result<(), StorageError> {
        let record = EmbeddingRecord {
            model_version: key.model_version.clone(),
            dimensions,
            created_at: Utc::now(),
        };
        let row_key = key.to_bytes();

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_EMBEDDINGS)?, &row_key, blob);
        batch.put_cf(self.cf(CF_EMBEDDING_META)?, &row_key, record.to_bytes()?);
        batch.put_cf(self.cf(CF_EMBEDDING_VERSIONS)?, key.index_key().to_bytes(), b"");
        self.db.write(batch)?;

        debug!(
            hash = %key.content_hash,
            version = %key.model_version,
            dimensions,
            "Stored embedding"
        );
        Ok(())
    }

    /// Get the raw vector blob for (hash, version)
    pub fn get_embedding(&self, key: &EmbeddingKey) -> Result<Option<Vec<u8>>, StorageError> {
        let result = self.db.get_cf(self.cf(CF_EMBEDDINGS)?, key.to_bytes())?;
        Ok(result)
    }

    /// Get blob and metadata for (hash, version)
    pub fn get_embedding_row(
        &self,
        key: &EmbeddingKey,
    ) -> Result<Option<EmbeddingRow>, StorageError> {
        let row_key = key.to_bytes();
        let Some(blob) = self.db.get_cf(self.cf(CF_EMBEDDINGS)?, &row_key)? else {
            return Ok(None);
        };
        let meta = self
            .db
            .get_cf(self.cf(CF_EMBEDDING_META)?, &row_key)?
            .ok_or_else(|| {
                StorageError::Serialization(format!(
                    "missing metadata for {}",
                    String::from_utf8_lossy(&row_key)
                ))
            })?;

        Ok(Some(EmbeddingRow {
            key: key.clone(),
            blob,
            record: EmbeddingRecord::from_bytes(&meta)?,
        }))
    }

    /// Delete every row for a content hash, across all model versions.
    ///
    /// Returns the number of rows removed.
    pub fn delete_embeddings_for_hash(&self, content_hash: &str) -> Result<usize, StorageError> {
        let prefix = EmbeddingKey::hash_prefix(content_hash);
        let keys: Vec<EmbeddingKey> = self
            .scan_prefix(CF_EMBEDDINGS, &prefix)?
            .iter()
            .map(|k| EmbeddingKey::from_bytes(k))
            .collect::<Result<_, _>>()?;

        let count = self.delete_rows(&keys)?;
        if count > 0 {
            debug!(hash = %content_hash, count, "Deleted embeddings for hash");
        }
        Ok(count)
    }

    /// Delete every row stamped with `model_version`.
    pub fn delete_embeddings_for_version(
        &self,
        model_version: &str,
    ) -> Result<usize, StorageError> {
        let keys = self.keys_for_version(model_version)?;
        let count = self.delete_rows(&keys)?;
        info!(version = %model_version, count, "Deleted embeddings for model version");
        Ok(count)
    }

    /// Delete every row whose model version is not `model_version`.
    pub fn delete_embeddings_except_version(
        &self,
        model_version: &str,
    ) -> Result<usize, StorageError> {
        let keep = VersionIndexKey::prefix(model_version);
        let keys: Vec<EmbeddingKey> = self
            .scan_prefix(CF_EMBEDDING_VERSIONS, &[])?
            .into_iter()
            .filter(|k| !k.starts_with(&keep))
            .map(|k| VersionIndexKey::from_bytes(&k).map(|idx| idx.row_key()))
            .collect::<Result<_, _>>()?;

        let count = self.delete_rows(&keys)?;
        info!(kept = %model_version, count, "Deleted embeddings from other model versions");
        Ok(count)
    }

    /// Number of rows stamped with `model_version`
    pub fn count_embeddings(&self, model_version: &str) -> Result<u64, StorageError> {
        let prefix = VersionIndexKey::prefix(model_version);
        Ok(self.scan_prefix(CF_EMBEDDING_VERSIONS, &prefix)?.len() as u64)
    }

    /// Row counts per model version
    pub fn count_by_version(&self) -> Result<BTreeMap<String, u64>, StorageError> {
        let mut counts = BTreeMap::new();
        for key in self.scan_prefix(CF_EMBEDDING_VERSIONS, &[])? {
            let index = VersionIndexKey::from_bytes(&key)?;
            *counts.entry(index.model_version).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn keys_for_version(&self, model_version: &str) -> Result<Vec<EmbeddingKey>, StorageError> {
        let prefix = VersionIndexKey::prefix(model_version);
        self.scan_prefix(CF_EMBEDDING_VERSIONS, &prefix)?
            .iter()
            .map(|k| VersionIndexKey::from_bytes(k).map(|idx| idx.row_key()))
            .collect()
    }

    fn delete_rows(&self, keys: &[EmbeddingKey]) -> Result<usize, StorageError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let embeddings_cf = self.cf(CF_EMBEDDINGS)?;
        let meta_cf = self.cf(CF_EMBEDDING_META)?;
        let versions_cf = self.cf(CF_EMBEDDING_VERSIONS)?;

        let mut batch = WriteBatch::default();
        for key in keys {
            let row_key = key.to_bytes();
            batch.delete_cf(embeddings_cf, &row_key);
            batch.delete_cf(meta_cf, &row_key);
            batch.delete_cf(versions_cf, key.index_key().to_bytes());
        }
        self.db.write(batch)?;
        Ok(keys.len())
    }

    /// Collect keys under `prefix` (an empty prefix scans the whole family)
    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StorageError> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut keys = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let by_version = self.count_by_version()?;
        Ok(StorageStats {
            embedding_count: by_version.values().sum(),
            by_version,
            disk_usage_bytes: self.get_disk_usage(),
        })
    }

    fn get_disk_usage(&self) -> u64 {
        let Ok(entries) = std::fs::read_dir(self.db.path()) else {
            return 0;
        };
        entries
            .flatten()
            .filter_map(|entry| entry.metadata().ok())
            .map(|metadata| metadata.len())
            .sum()
    }
}

/// Statistics about the storage.
#[derive(Debug, Default, Clone, Serialize)]
pub struct StorageStats {
    /// Rows across all model versions
    pub embedding_count: u64,
    /// Rows per model version
    pub by_version: BTreeMap<String, u64>,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}
