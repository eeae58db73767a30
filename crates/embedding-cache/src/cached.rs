//! Cache-aware embedding generation.
//!
//! [`CachedBatchEmbedder`] checks the [`EmbeddingCache`] first, sends only
//! the misses to the [`BatchEmbedder`], writes the fresh vectors back and
//! reassembles results in input order.
//!
//! The cache only holds normalized vectors, so a request with
//! `normalize: false` bypasses it the same way `use_cache: false` does.
//! Storage failures are fail-closed here: they abort the call.

use std::collections::HashMap;
use std::sync::Arc;

use embedding_model::{
    is_blank, BatchEmbedder, BatchProgress, Embedding, ProgressFn, DEFAULT_BATCH_SIZE,
};
use tracing::debug;

use crate::cache::{CacheStats, EmbeddingCache};
use crate::error::{CacheError, EmbedError};

/// Options for a single cached embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedOptions {
    pub use_cache: bool,
    pub normalize: bool,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            normalize: true,
        }
    }
}

/// Options for a cached batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub use_cache: bool,
    pub batch_size: usize,
    pub normalize: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            batch_size: DEFAULT_BATCH_SIZE,
            normalize: true,
        }
    }
}

/// Composes a [`BatchEmbedder`] with an [`EmbeddingCache`].
#[derive(Debug, Clone)]
pub struct CachedBatchEmbedder {
    embedder: BatchEmbedder,
    cache: Arc<EmbeddingCache>,
}

impl CachedBatchEmbedder {
    pub fn new(embedder: BatchEmbedder, cache: Arc<EmbeddingCache>) -> Self {
        Self { embedder, cache }
    }

    pub fn embedder(&self) -> &BatchEmbedder {
        &self.embedder
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        self.cache.stats()
    }

    /// Embed one text, reading and writing the cache unless bypassed.
    ///
    /// Blank text yields the zero vector and never touches the cache.
    pub async fn embed_one_cached(
        &self,
        text: &str,
        options: EmbedOptions,
    ) -> Result<Embedding, EmbedError> {
        if is_blank(text) {
            return Ok(Embedding::zeros(self.embedder.dimensions()));
        }
        let use_cache = options.use_cache && options.normalize;

        if use_cache {
            if let Some(hit) = self.cache.get(text)? {
                return Ok(hit);
            }
        }

        let embedding = self.embedder.embed_one(text, options.normalize).await?;
        if use_cache {
            self.cache.put(text, &embedding)?;
        }
        Ok(embedding)
    }

    /// Embed many texts, computing only the ones the cache does not hold.
    ///
    /// Output order matches input order. Repeated texts are looked up and
    /// computed once, then copied to every slot they occupy. Progress events
    /// always carry the full input length as `total` and fire once per slot;
    /// cache hits are reported while probing, computed slots after them.
    pub async fn embed_many_cached(
        &self,
        texts: &[String],
        options: BatchOptions,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<Vec<Embedding>, EmbedError> {
        let total = texts.len();
        let use_cache = options.use_cache && options.normalize;

        let mut slots: Vec<Option<Embedding>> = vec![None; total];
        let mut seen: HashMap<&str, Lookup> = HashMap::new();
        // One entry per unique uncached text, with every slot it fills
        let mut misses: Vec<(&str, Vec<usize>)> = Vec::new();
        let mut hits = 0usize;

        for (index, text) in texts.iter().enumerate() {
            let lookup = match seen.get(text.as_str()) {
                Some(lookup) => lookup.clone(),
                None => {
                    let cached = if use_cache && !is_blank(text) {
                        self.cache.get(text)?
                    } else {
                        None
                    };
                    let lookup = match cached {
                        Some(hit) => Lookup::Hit(hit),
                        None => Lookup::Miss(misses.len()),
                    };
                    if let Lookup::Miss(_) = lookup {
                        misses.push((text.as_str(), Vec::new()));
                    }
                    seen.insert(text.as_str(), lookup.clone());
                    lookup
                }
            };

            match lookup {
                Lookup::Hit(embedding) => {
                    slots[index] = Some(embedding);
                    hits += 1;
                    if let Some(report) = on_progress {
                        report(BatchProgress::new(hits, total));
                    }
                }
                Lookup::Miss(group) => misses[group].1.push(index),
            }
        }

        let unique: Vec<String> = misses.iter().map(|(text, _)| text.to_string()).collect();
        debug!(
            total,
            hits,
            unique_misses = unique.len(),
            "Checked embedding cache"
        );

        // Slots resolved once the first k unique texts are computed
        let resolved: Vec<usize> = misses
            .iter()
            .scan(hits, |done, (_, indices)| {
                *done += indices.len();
                Some(*done)
            })
            .collect();
        let fan_out = |p: BatchProgress| {
            let Some(report) = on_progress else {
                return;
            };
            let upto = resolved[p.current - 1];
            let from = if p.current == 1 { hits } else { resolved[p.current - 2] };
            for current in from + 1..=upto {
                report(BatchProgress::new(current, total));
            }
        };
        let computed = self
            .embedder
            .embed_many(&unique, options.batch_size, options.normalize, Some(&fan_out))
            .await?;

        for ((text, indices), embedding) in misses.iter().zip(computed) {
            if use_cache && !is_blank(text) {
                self.cache.put(text, &embedding)?;
            }
            for &index in indices {
                slots[index] = Some(embedding.clone());
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

/// Outcome of the first cache lookup for a distinct text.
#[derive(Clone)]
enum Lookup {
    Hit(Embedding),
    /// Index into the list of unique misses
    Miss(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let one = EmbedOptions::default();
        assert!(one.use_cache && one.normalize);

        let many = BatchOptions::default();
        assert!(many.use_cache && many.normalize);
        assert_eq!(many.batch_size, DEFAULT_BATCH_SIZE);
    }
}
