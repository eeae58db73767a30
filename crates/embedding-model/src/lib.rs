//! # embedding-model
//!
//! Local embedding generation using Candle, behind a lazy single-flight
//! model coordinator.
//!
//! ## Features
//! - all-MiniLM-L6-v2 model (384 dimensions), downloaded once into a
//!   writable cache directory
//! - [`ModelCoordinator`]: exactly one load per loaded lifetime, concurrent
//!   callers wait on the in-flight load, failures replay until unload
//! - [`BatchEmbedder`]: single and batch embedding with per-item progress
//! - [`vector`]: normalization, cosine similarity, blob encoding

pub mod batch;
pub mod candle;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod model_cache;
pub mod vector;

pub use crate::candle::{CandleEmbedder, EMBEDDING_DIM};
pub use batch::{is_blank, BatchEmbedder, BatchProgress, ProgressFn, DEFAULT_BATCH_SIZE};
pub use coordinator::{
    CandleLoader, LoadProgress, ModelCoordinator, ModelHandle, ModelLoader, ModelState,
    ProgressSink,
};
pub use error::EmbeddingError;
pub use model::{Embedding, EmbeddingModel, ModelInfo};
pub use model_cache::{
    get_or_download_model, ModelCache, ModelPaths, DEFAULT_MODEL_REPO, MODEL_FILES,
};
