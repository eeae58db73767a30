//! Model and inference errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// A model file is missing or unreadable
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("Failed to download model: {0}")]
    Download(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Model initialization failed. Replayed to every caller until unload.
    #[error("Model unavailable: {0}")]
    LoadFailure(String),

    /// The model ran but its output was unusable
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vector length differs from the configured or compared dimension
    #[error("Vector has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Whether this error comes from the model never becoming available,
    /// as opposed to a failure while running it.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, EmbeddingError::LoadFailure(_))
    }
}
