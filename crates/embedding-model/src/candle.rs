//! BERT sentence encoder on Candle.
//!
//! The shipped model is all-MiniLM-L6-v2 (384 dimensions). Output vectors are
//! mean-pooled over real tokens and left unnormalized; [`crate::BatchEmbedder`]
//! decides whether to rescale them.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::Deserialize;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::error::EmbeddingError;
use crate::model::{EmbeddingModel, ModelInfo};
use crate::model_cache::{get_or_download_model, ModelCache, ModelPaths};

/// Embedding dimension for all-MiniLM-L6-v2
pub const EMBEDDING_DIM: usize = 384;

/// Token limit per input; longer texts are truncated
pub const MAX_SEQ_LENGTH: usize = 256;

/// The subset of `config.json` needed to describe the model.
#[derive(Deserialize)]
struct Shape {
    hidden_size: usize,
    #[serde(default)]
    max_position_embeddings: Option<usize>,
}

pub struct CandleEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    info: ModelInfo,
}

impl CandleEmbedder {
    /// Load from `cache`, downloading missing files first.
    pub fn load(cache: &ModelCache) -> Result<Self, EmbeddingError> {
        let paths = get_or_download_model(cache, &|_| {})?;
        Self::load_from_paths(model_name(&cache.repo_id), &paths)
    }

    pub fn load_default() -> Result<Self, EmbeddingError> {
        Self::load(&ModelCache::default())
    }

    /// Load from files already on disk.
    pub fn load_from_paths(name: &str, paths: &ModelPaths) -> Result<Self, EmbeddingError> {
        info!(model = name, "Loading embedding model");
        let device = Device::Cpu;

        let raw_config = std::fs::read_to_string(&paths.config)?;
        let config: BertConfig = serde_json::from_str(&raw_config)
            .map_err(|e| EmbeddingError::ModelNotFound(format!("invalid config.json: {e}")))?;
        let shape: Shape = serde_json::from_str(&raw_config)
            .map_err(|e| EmbeddingError::ModelNotFound(format!("invalid config.json: {e}")))?;
        let max_sequence_length = shape
            .max_position_embeddings
            .map_or(MAX_SEQ_LENGTH, |m| m.min(MAX_SEQ_LENGTH));

        let tokenizer = prepare_tokenizer(&paths.tokenizer, max_sequence_length)?;

        // SAFETY: the weights file is not modified while mapped
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&paths.weights], DType::F32, &device)?
        };
        let model = BertModel::load(vb, &config)?;

        info!(
            model = name,
            dim = shape.hidden_size,
            max_seq = max_sequence_length,
            "Embedding model ready"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            info: ModelInfo {
                name: name.to_string(),
                dimension: shape.hidden_size,
                max_sequence_length,
            },
        })
    }

    /// Average token vectors, ignoring padding positions.
    fn mean_pool(hidden: &Tensor, mask: &Tensor) -> Result<Tensor, EmbeddingError> {
        let mask = mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
        Ok(summed.broadcast_div(&counts)?)
    }
}

impl EmbeddingModel for CandleEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let mut ids = Vec::with_capacity(encodings.len());
        let mut masks = Vec::with_capacity(encodings.len());
        for encoding in &encodings {
            ids.push(Tensor::new(encoding.get_ids(), &self.device)?);
            masks.push(Tensor::new(encoding.get_attention_mask(), &self.device)?);
        }
        let input_ids = Tensor::stack(&ids, 0)?;
        let attention_mask = Tensor::stack(&masks, 0)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let vectors: Vec<Vec<f32>> = Self::mean_pool(&hidden, &attention_mask)?.to_vec2()?;

        debug!(count = vectors.len(), tokens = input_ids.dim(1)?, "Encoded batch");
        Ok(vectors)
    }
}

/// Pad each batch to its longest member and truncate at `max_length`.
fn prepare_tokenizer(path: &Path, max_length: usize) -> Result<Tokenizer, EmbeddingError> {
    let mut tokenizer =
        Tokenizer::from_file(path).map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        ..PaddingParams::default()
    }));
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..TruncationParams::default()
        }))
        .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
    Ok(tokenizer)
}

/// Last path segment of a HuggingFace repo id.
pub(crate) fn model_name(repo_id: &str) -> &str {
    repo_id.rsplit('/').next().unwrap_or(repo_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;

    #[test]
    fn test_model_name() {
        assert_eq!(
            model_name("sentence-transformers/all-MiniLM-L6-v2"),
            "all-MiniLM-L6-v2"
        );
        assert_eq!(model_name("local-model"), "local-model");
    }

    #[test]
    fn test_shape_parses_minilm_config() {
        let shape: Shape =
            serde_json::from_str(r#"{"hidden_size": 384, "max_position_embeddings": 512}"#)
                .unwrap();
        assert_eq!(shape.hidden_size, EMBEDDING_DIM);
        assert_eq!(shape.max_position_embeddings, Some(512));
    }

    // Model-backed tests need a download:
    // cargo test -p embedding-model -- --ignored

    #[test]
    #[ignore = "requires model download"]
    fn test_load_model() {
        let embedder = CandleEmbedder::load_default().unwrap();
        assert_eq!(embedder.info().dimension, EMBEDDING_DIM);
        assert_eq!(embedder.info().name, "all-MiniLM-L6-v2");
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_embed_batch_shapes() {
        let embedder = CandleEmbedder::load_default().unwrap();
        let long = "word ".repeat(1000);
        let vectors = embedder.embed_batch(&["short", long.as_str()]).unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == EMBEDDING_DIM));
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_paraphrases_score_higher() {
        let embedder = CandleEmbedder::load_default().unwrap();
        let a = embedder.embed("The cat sat on the mat").unwrap();
        let b = embedder.embed("A cat is sitting on a mat").unwrap();
        let c = embedder.embed("Quarterly revenue grew by four percent").unwrap();

        assert!(cosine_similarity(&a, &b).unwrap() > cosine_similarity(&a, &c).unwrap());
    }
}
