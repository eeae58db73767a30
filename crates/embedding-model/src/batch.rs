//! Single and batch embedding generation with per-item progress.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::coordinator::ModelCoordinator;
use crate::error::EmbeddingError;
use crate::model::Embedding;

/// Default batch size for embedding
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Snapshot emitted after each item of a batch resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    /// Items resolved so far, 1..=total
    pub current: usize,
    /// Size of the whole batch
    pub total: usize,
    /// round(current / total * 100)
    pub percentage: u8,
}

impl BatchProgress {
    pub fn new(current: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            ((current as f64 / total as f64) * 100.0).round() as u8
        };
        Self {
            current,
            total,
            percentage,
        }
    }
}

/// Progress callback invoked once per resolved item.
pub type ProgressFn<'a> = &'a (dyn Fn(BatchProgress) + Send + Sync);

/// Empty or whitespace-only text never reaches the model.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Generates embeddings through the coordinator's shared model.
#[derive(Debug, Clone)]
pub struct BatchEmbedder {
    coordinator: Arc<ModelCoordinator>,
    dimensions: usize,
}

impl BatchEmbedder {
    /// `dimensions` is the length every vector must have; it also sizes the
    /// zero vector returned for blank input.
    pub fn new(coordinator: Arc<ModelCoordinator>, dimensions: usize) -> Self {
        Self {
            coordinator,
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn coordinator(&self) -> &Arc<ModelCoordinator> {
        &self.coordinator
    }

    /// Embed one text.
    pub async fn embed_one(
        &self,
        text: &str,
        normalize: bool,
    ) -> Result<Embedding, EmbeddingError> {
        if is_blank(text) {
            return Ok(Embedding::zeros(self.dimensions));
        }
        let values = self
            .run_model(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::Inference("model returned no vector".to_string()))?;
        self.finish(values, normalize)
    }

    /// Embed many texts, returning one vector per input in input order.
    ///
    /// Texts go to the model `batch_size` at a time. Any failure aborts the
    /// whole call; no partial output is returned.
    pub async fn embed_many(
        &self,
        texts: &[String],
        batch_size: usize,
        normalize: bool,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        let total = texts.len();
        let mut results = Vec::with_capacity(total);
        if total == 0 {
            return Ok(results);
        }

        for chunk in texts.chunks(batch_size.max(1)) {
            let pending: Vec<String> = chunk.iter().filter(|t| !is_blank(t)).cloned().collect();
            let mut computed = if pending.is_empty() {
                Vec::new().into_iter()
            } else {
                self.run_model(pending).await?.into_iter()
            };

            for text in chunk {
                let embedding = if is_blank(text) {
                    Embedding::zeros(self.dimensions)
                } else {
                    let values = computed.next().ok_or_else(|| {
                        EmbeddingError::Inference("model returned too few vectors".to_string())
                    })?;
                    self.finish(values, normalize)?
                };
                results.push(embedding);
                if let Some(report) = on_progress {
                    report(BatchProgress::new(results.len(), total));
                }
            }
            debug!(done = results.len(), total, "Embedded chunk");
        }

        Ok(results)
    }

    async fn run_model(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = self.coordinator.acquire(None).await?;
        let expected = texts.len();

        let vectors = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            model.embed_batch(&refs)
        })
        .await
        .map_err(|e| EmbeddingError::Inference(format!("embedding task failed: {e}")))??;

        if vectors.len() != expected {
            return Err(EmbeddingError::Inference(format!(
                "model returned {} vectors for {} texts",
                vectors.len(),
                expected
            )));
        }
        Ok(vectors)
    }

    fn finish(&self, values: Vec<f32>, normalize: bool) -> Result<Embedding, EmbeddingError> {
        if values.len() != self.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                actual: values.len(),
            });
        }
        let embedding = Embedding::new(values);
        Ok(if normalize {
            embedding.normalized()
        } else {
            embedding
        })
    }
}
