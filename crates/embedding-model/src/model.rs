//! Embedding model trait and types.
//!
//! Defines the interface for generating vector embeddings from text.

use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;
use crate::vector;

/// Vector embedding - a fixed-length float array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Wrap raw model output as-is.
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// The all-zero sentinel returned for blank input.
    pub fn zeros(dimension: usize) -> Self {
        Self {
            values: vec![0.0; dimension],
        }
    }

    /// Rescale to unit length (no-op for a zero vector).
    pub fn normalized(self) -> Self {
        Self {
            values: vector::normalized(self.values),
        }
    }

    /// Get the embedding dimension
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn is_zero(&self) -> bool {
        vector::is_zero(&self.values)
    }

    pub fn norm(&self) -> f32 {
        vector::l2_norm(&self.values)
    }

    /// Compute cosine similarity with another embedding.
    /// Returns value in [-1, 1] range (1 = identical).
    pub fn cosine_similarity(&self, other: &Embedding) -> Result<f32, EmbeddingError> {
        vector::cosine_similarity(&self.values, &other.values)
    }

    /// Raw little-endian f32 bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        vector::to_le_bytes(&self.values)
    }

    /// Decode raw little-endian f32 bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        vector::from_le_bytes(bytes).map(Self::new)
    }
}

/// Model information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub name: String,
    /// Embedding dimension
    pub dimension: usize,
    /// Maximum sequence length in tokens
    pub max_sequence_length: usize,
}

/// Trait for embedding models.
///
/// Implementations must be thread-safe (Send + Sync) for concurrent use.
/// Inference is blocking; async callers run it on a blocking thread.
pub trait EmbeddingModel: Send + Sync {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Generate raw (unnormalized) vectors for multiple texts, one per input.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Generate a raw vector for a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbeddingError::Inference("model returned no vector".to_string()))
    }
}
