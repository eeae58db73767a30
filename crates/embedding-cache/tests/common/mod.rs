//! Shared harness for cached-embedding integration tests.
//!
//! The model is a deterministic byte hash, so tests run without a download
//! and every text maps to a stable, non-zero vector.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use embedding_cache::{CachedBatchEmbedder, EmbeddingCache};
use embedding_model::{
    BatchEmbedder, BatchProgress, EmbeddingError, EmbeddingModel, LoadProgress, ModelCoordinator,
    ModelHandle, ModelInfo, ModelLoader,
};
use embedding_storage::Storage;

pub const DIM: usize = 16;
pub const VERSION: &str = "bytes@v1";

/// Counts model invocations and the texts passed to them.
#[derive(Default)]
pub struct Counters {
    pub invocations: AtomicUsize,
    pub texts: Mutex<Vec<String>>,
}

impl Counters {
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

struct ByteModel {
    info: ModelInfo,
    counters: Arc<Counters>,
}

impl EmbeddingModel for ByteModel {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.counters.invocations.fetch_add(1, Ordering::SeqCst);
        self.counters
            .texts
            .lock()
            .unwrap()
            .extend(texts.iter().map(|t| t.to_string()));

        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.25f32; DIM];
                for (i, b) in t.bytes().enumerate() {
                    v[(i * 7 + b as usize) % DIM] += (b as f32) / 32.0;
                }
                v
            })
            .collect())
    }
}

struct ByteLoader {
    counters: Arc<Counters>,
}

impl ModelLoader for ByteLoader {
    fn load(&self, _progress: &dyn Fn(LoadProgress)) -> Result<ModelHandle, EmbeddingError> {
        Ok(Arc::new(ByteModel {
            info: ModelInfo {
                name: "bytes".to_string(),
                dimension: DIM,
                max_sequence_length: 128,
            },
            counters: Arc::clone(&self.counters),
        }))
    }
}

/// Temp-dir backed storage plus a cached embedder over the byte model.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub storage: Arc<Storage>,
    pub counters: Arc<Counters>,
    pub embedder: CachedBatchEmbedder,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_version(VERSION)
    }

    pub fn with_version(version: &str) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let storage =
            Arc::new(Storage::open(temp_dir.path()).expect("Failed to open test storage"));
        Self::over_storage(temp_dir, storage, version)
    }

    /// A second embedder sharing this harness's storage under `version`.
    pub fn sibling(&self, version: &str) -> CachedBatchEmbedder {
        build_embedder(Arc::clone(&self.storage), Arc::clone(&self.counters), version)
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        self.embedder.cache()
    }

    fn over_storage(temp_dir: tempfile::TempDir, storage: Arc<Storage>, version: &str) -> Self {
        let counters = Arc::new(Counters::default());
        let embedder = build_embedder(Arc::clone(&storage), Arc::clone(&counters), version);
        Self {
            _temp_dir: temp_dir,
            storage,
            counters,
            embedder,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn build_embedder(
    storage: Arc<Storage>,
    counters: Arc<Counters>,
    version: &str,
) -> CachedBatchEmbedder {
    let coordinator = Arc::new(ModelCoordinator::new(Arc::new(ByteLoader { counters })));
    let cache = Arc::new(EmbeddingCache::new(storage, version));
    CachedBatchEmbedder::new(BatchEmbedder::new(coordinator, DIM), cache)
}

pub fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Collects progress events for later assertions.
#[derive(Default)]
pub struct ProgressLog(Mutex<Vec<BatchProgress>>);

impl ProgressLog {
    pub fn record(&self, progress: BatchProgress) {
        self.0.lock().unwrap().push(progress);
    }

    pub fn events(&self) -> Vec<BatchProgress> {
        self.0.lock().unwrap().clone()
    }
}
