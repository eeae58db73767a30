//! Content-addressed embedding cache.
//!
//! Vectors are keyed by the SHA-256 of their source text and scoped by model
//! version: rows written under another version are invisible to lookups and
//! stay on disk until [`EmbeddingCache::clear_stale`] reclaims them.
//!
//! Hit/miss counters belong to the cache instance and are not persisted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use embedding_model::Embedding;
use embedding_storage::{EmbeddingKey, Storage};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::CacheError;

/// SHA-256 of the UTF-8 bytes, as 64 lowercase hex chars.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Snapshot of cache counters and size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses), 0.0 before any lookup
    pub hit_rate: f64,
    /// Persisted rows for the active model version
    pub total_entries: u64,
    pub model_version: String,
}

/// A persisted row, as returned by [`EmbeddingCache::entry`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub content_hash: String,
    pub embedding: Embedding,
    pub model_version: String,
    pub dimensions: usize,
    pub created_at: DateTime<Utc>,
}

/// Persistent vector cache over an injected [`Storage`] handle.
pub struct EmbeddingCache {
    storage: Arc<Storage>,
    model_version: String,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(storage: Arc<Storage>, model_version: impl Into<String>) -> Self {
        Self {
            storage,
            model_version: model_version.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Digest used as the cache key for `content`.
    pub fn hash(content: &str) -> String {
        content_hash(content)
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    fn key(&self, content: &str) -> Result<EmbeddingKey, CacheError> {
        Ok(EmbeddingKey::new(content_hash(content), self.model_version.as_str())?)
    }

    /// Look up the vector for `content` under the active model version.
    ///
    /// Every successful lookup counts as a hit or a miss.
    pub fn get(&self, content: &str) -> Result<Option<Embedding>, CacheError> {
        let key = self.key(content)?;
        match self.storage.get_embedding(&key)? {
            Some(blob) => {
                let embedding = decode(&key.content_hash, &blob)?;
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(hash = %key.content_hash, "Embedding cache hit");
                Ok(Some(embedding))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(hash = %key.content_hash, "Embedding cache miss");
                Ok(None)
            }
        }
    }

    /// Store the vector for `content`, overwriting any previous row for the
    /// same (hash, version). Zero vectors are never stored.
    pub fn put(&self, content: &str, embedding: &Embedding) -> Result<(), CacheError> {
        if embedding.dimension() == 0 || embedding.is_zero() {
            debug!("Skipping cache write for zero vector");
            return Ok(());
        }
        let key = self.key(content)?;
        self.storage
            .put_embedding(&key, &embedding.to_bytes(), embedding.dimension())?;
        Ok(())
    }

    /// Inspect the persisted row for `content` without touching counters.
    pub fn entry(&self, content: &str) -> Result<Option<CacheEntry>, CacheError> {
        let key = self.key(content)?;
        let Some(row) = self.storage.get_embedding_row(&key)? else {
            return Ok(None);
        };
        let embedding = decode(&key.content_hash, &row.blob)?;
        if embedding.dimension() != row.record.dimensions {
            return Err(CacheError::Corrupt {
                content_hash: key.content_hash,
                reason: format!(
                    "blob holds {} floats, metadata says {}",
                    embedding.dimension(),
                    row.record.dimensions
                ),
            });
        }
        Ok(Some(CacheEntry {
            content_hash: key.content_hash,
            embedding,
            model_version: row.record.model_version,
            dimensions: row.record.dimensions,
            created_at: row.record.created_at,
        }))
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        };
        Ok(CacheStats {
            hits,
            misses,
            hit_rate,
            total_entries: self.storage.count_embeddings(&self.model_version)?,
            model_version: self.model_version.clone(),
        })
    }

    /// Remove the rows for `content` under every model version.
    ///
    /// Returns whether anything was removed.
    pub fn invalidate(&self, content: &str) -> Result<bool, CacheError> {
        let removed = self
            .storage
            .delete_embeddings_for_hash(&content_hash(content))?;
        Ok(removed > 0)
    }

    /// Delete all rows for the active model version and reset counters.
    pub fn clear_current(&self) -> Result<usize, CacheError> {
        let deleted = self
            .storage
            .delete_embeddings_for_version(&self.model_version)?;
        self.reset_counters();
        info!(version = %self.model_version, deleted, "Cleared embedding cache");
        Ok(deleted)
    }

    /// Delete rows written under any other model version. Counters are kept.
    pub fn clear_stale(&self) -> Result<usize, CacheError> {
        let deleted = self
            .storage
            .delete_embeddings_except_version(&self.model_version)?;
        info!(version = %self.model_version, deleted, "Cleared stale embeddings");
        Ok(deleted)
    }

    pub fn reset_counters(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("model_version", &self.model_version)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn decode(content_hash: &str, blob: &[u8]) -> Result<Embedding, CacheError> {
    Embedding::from_bytes(blob).ok_or_else(|| CacheError::Corrupt {
        content_hash: content_hash.to_string(),
        reason: format!("blob length {} is not a multiple of 4", blob.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn create_test_cache(version: &str) -> (EmbeddingCache, Arc<Storage>, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let cache = EmbeddingCache::new(Arc::clone(&storage), version);
        (cache, storage, temp)
    }

    fn vector(seed: f32) -> Embedding {
        Embedding::new(vec![seed, seed + 1.0, seed + 2.0, -seed])
    }

    #[test]
    fn test_hash_format() {
        let digest = content_hash("hello world");
        assert_eq!(digest.len(), 64);
        assert!(digest
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(EmbeddingCache::hash("hello world"), digest);
    }

    #[test]
    fn test_hash_collision_free_on_corpus() {
        let mut corpus: Vec<String> = (0..500).map(|i| format!("document {i}")).collect();
        corpus.extend((0..500).map(|_| format!("{:x}", rand::random::<u64>())));
        corpus.push(String::new());
        corpus.push(" ".to_string());
        corpus.sort();
        corpus.dedup();

        let digests: HashSet<String> = corpus.iter().map(|c| content_hash(c)).collect();
        assert_eq!(digests.len(), corpus.len());
        assert!(corpus.iter().all(|c| content_hash(c) == content_hash(c)));
    }

    #[test]
    fn test_get_miss_then_hit() {
        let (cache, _storage, _temp) = create_test_cache("v1");

        assert!(cache.get("alpha").unwrap().is_none());
        cache.put("alpha", &vector(1.0)).unwrap();
        assert_eq!(cache.get("alpha").unwrap(), Some(vector(1.0)));

        let stats = cache.stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.model_version, "v1");
    }

    #[test]
    fn test_hit_rate_zero_without_lookups() {
        let (cache, _storage, _temp) = create_test_cache("v1");
        let stats = cache.stats().unwrap();
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn test_put_overwrites() {
        let (cache, _storage, _temp) = create_test_cache("v1");
        cache.put("same", &vector(1.0)).unwrap();
        cache.put("same", &vector(5.0)).unwrap();

        assert_eq!(cache.get("same").unwrap(), Some(vector(5.0)));
        assert_eq!(cache.stats().unwrap().total_entries, 1);
    }

    #[test]
    fn test_zero_vector_not_stored() {
        let (cache, _storage, _temp) = create_test_cache("v1");
        cache.put("", &Embedding::zeros(4)).unwrap();
        assert_eq!(cache.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn test_entry_metadata() {
        let (cache, _storage, _temp) = create_test_cache("v1");
        let before = Utc::now();
        cache.put("doc", &vector(2.0)).unwrap();

        let entry = cache.entry("doc").unwrap().unwrap();
        assert_eq!(entry.content_hash, content_hash("doc"));
        assert_eq!(entry.dimensions, 4);
        assert_eq!(entry.model_version, "v1");
        assert!(entry.created_at >= before);

        // entry() does not count as a lookup
        assert_eq!(cache.stats().unwrap().hits, 0);
    }

    #[test]
    fn test_versions_partition_cache() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let old = EmbeddingCache::new(Arc::clone(&storage), "v1");
        let new = EmbeddingCache::new(Arc::clone(&storage), "v2");

        old.put("text", &vector(1.0)).unwrap();
        assert!(new.get("text").unwrap().is_none());
        assert_eq!(new.stats().unwrap().total_entries, 0);

        new.put("text", &vector(2.0)).unwrap();
        assert_eq!(old.get("text").unwrap(), Some(vector(1.0)));
        assert_eq!(new.get("text").unwrap(), Some(vector(2.0)));
    }

    #[test]
    fn test_separate_stores_are_isolated() {
        let (a, _sa, _ta) = create_test_cache("v1");
        let (b, _sb, _tb) = create_test_cache("v1");

        a.put("shared text", &vector(3.0)).unwrap();

        assert!(b.get("shared text").unwrap().is_none());
        assert_eq!(b.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn test_invalidate() {
        let (cache, _storage, _temp) = create_test_cache("v1");
        cache.put("keep", &vector(1.0)).unwrap();
        cache.put("drop", &vector(2.0)).unwrap();

        assert!(!cache.invalidate("never stored").unwrap());
        assert_eq!(cache.stats().unwrap().total_entries, 2);

        assert!(cache.invalidate("drop").unwrap());
        assert!(cache.get("drop").unwrap().is_none());
        assert_eq!(cache.get("keep").unwrap(), Some(vector(1.0)));
    }

    #[test]
    fn test_invalidate_spans_versions() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let old = EmbeddingCache::new(Arc::clone(&storage), "v1");
        let new = EmbeddingCache::new(Arc::clone(&storage), "v2");
        old.put("text", &vector(1.0)).unwrap();
        new.put("text", &vector(2.0)).unwrap();

        assert!(new.invalidate("text").unwrap());
        assert!(old.entry("text").unwrap().is_none());
    }

    #[test]
    fn test_clear_current_resets_counters() {
        let (cache, _storage, _temp) = create_test_cache("v1");
        for text in ["a", "b", "c"] {
            cache.put(text, &vector(1.0)).unwrap();
        }
        cache.get("a").unwrap();
        cache.get("missing").unwrap();

        assert_eq!(cache.clear_current().unwrap(), 3);

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_clear_stale_keeps_current_and_counters() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let old = EmbeddingCache::new(Arc::clone(&storage), "v1");
        let current = EmbeddingCache::new(Arc::clone(&storage), "v2");
        old.put("x", &vector(1.0)).unwrap();
        old.put("y", &vector(1.0)).unwrap();
        current.put("x", &vector(2.0)).unwrap();
        current.get("x").unwrap();

        assert_eq!(current.clear_stale().unwrap(), 2);

        assert_eq!(old.stats().unwrap().total_entries, 0);
        let stats = current.stats().unwrap();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.hits, 1);
    }
}
