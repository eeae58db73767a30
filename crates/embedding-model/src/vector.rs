//! Vector math shared by the embedder and the cache.
//!
//! Pure functions over `f32` slices. Blob encoding is little-endian IEEE-754
//! f32 on every platform.

use crate::error::EmbeddingError;

/// Euclidean length of a vector
pub fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Rescale in place to unit length. Zero-magnitude input is left unchanged.
pub fn normalize(values: &mut [f32]) {
    let norm = l2_norm(values);
    if norm > 0.0 && norm.is_finite() {
        for x in values.iter_mut() {
            *x /= norm;
        }
    }
}

/// Owned variant of [`normalize`]
pub fn normalized(mut values: Vec<f32>) -> Vec<f32> {
    normalize(&mut values);
    values
}

/// True when every component is exactly zero (the blank-input sentinel)
pub fn is_zero(values: &[f32]) -> bool {
    values.iter().all(|x| *x == 0.0)
}

fn check_dimensions(a: &[f32], b: &[f32]) -> Result<(), EmbeddingError> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

/// Dot product; both vectors must have the same length
pub fn dot(a: &[f32], b: &[f32]) -> Result<f32, EmbeddingError> {
    check_dimensions(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Cosine similarity in [-1, 1].
///
/// Returns 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, EmbeddingError> {
    let product = dot(a, b)?;
    let denom = l2_norm(a) * l2_norm(b);
    if denom == 0.0 {
        return Ok(0.0);
    }
    Ok(product / denom)
}

/// Rank candidates by cosine similarity to `query`, highest first.
///
/// Returns up to `top_k` `(candidate_index, score)` pairs.
pub fn top_k_similar(
    query: &[f32],
    candidates: &[Vec<f32>],
    top_k: usize,
) -> Result<Vec<(usize, f32)>, EmbeddingError> {
    let mut scored = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| cosine_similarity(query, c).map(|score| (i, score)))
        .collect::<Result<Vec<_>, _>>()?;
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    Ok(scored)
}

/// Encode as raw little-endian f32 bytes
pub fn to_le_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode raw little-endian f32 bytes. `None` if the length is not a
/// multiple of four.
pub fn from_le_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}
