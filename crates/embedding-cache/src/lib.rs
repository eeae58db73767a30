//! # embedding-cache
//!
//! Persistent embedding cache keyed by the SHA-256 of the input text and
//! scoped by model version, plus a batch embedder that only computes
//! what the cache is missing.
//!
//! ## Usage
//!
//! ```ignore
//! let cache = Arc::new(EmbeddingCache::new(storage, "all-MiniLM-L6-v2@v1"));
//! let embedder = CachedBatchEmbedder::new(batch_embedder, cache);
//! let vectors = embedder
//!     .embed_many_cached(&texts, BatchOptions::default(), None)
//!     .await?;
//! ```

pub mod cache;
pub mod cached;
pub mod error;

pub use cache::{content_hash, CacheEntry, CacheStats, EmbeddingCache};
pub use cached::{BatchOptions, CachedBatchEmbedder, EmbedOptions};
pub use error::{CacheError, EmbedError};
