//! Key encoding and decoding for storage layer.
//!
//! Row key format: `{content_hash}:{model_version}`
//! - content_hash: 64 lowercase hex chars, fixed width so every row for one
//!   hash shares the prefix `{content_hash}:`
//! - model_version: free-form identifier (may itself contain ':')
//!
//! Version index format: `{model_version}\0{content_hash}`, so every row of
//! one version shares the prefix `{model_version}\0`.

use crate::error::StorageError;

/// Length of a hex-encoded SHA-256 digest
pub const CONTENT_HASH_LEN: usize = 64;

fn validate_hash(content_hash: &str) -> Result<(), StorageError> {
    let well_formed = content_hash.len() == CONTENT_HASH_LEN
        && content_hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if well_formed {
        Ok(())
    } else {
        Err(StorageError::Key(format!(
            "content hash must be {} lowercase hex chars: {:?}",
            CONTENT_HASH_LEN, content_hash
        )))
    }
}

fn validate_version(model_version: &str) -> Result<(), StorageError> {
    if model_version.is_empty() || model_version.contains('\0') {
        return Err(StorageError::Key(format!(
            "invalid model version: {:?}",
            model_version
        )));
    }
    Ok(())
}

/// Key for an embedding row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingKey {
    pub content_hash: String,
    pub model_version: String,
}

impl EmbeddingKey {
    /// Create a key, validating both parts
    pub fn new(
        content_hash: impl Into<String>,
        model_version: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let content_hash = content_hash.into();
        let model_version = model_version.into();
        validate_hash(&content_hash)?;
        validate_version(&model_version)?;
        Ok(Self {
            content_hash,
            model_version,
        })
    }

    /// Encode key to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}:{}", self.content_hash, self.model_version).into_bytes()
    }

    /// Prefix shared by every version of one content hash
    pub fn hash_prefix(content_hash: &str) -> Vec<u8> {
        format!("{}:", content_hash).into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        if s.len() <= CONTENT_HASH_LEN + 1 || s.as_bytes()[CONTENT_HASH_LEN] != b':' {
            return Err(StorageError::Key(format!("Invalid embedding key: {}", s)));
        }
        let (hash, rest) = s.split_at(CONTENT_HASH_LEN);
        Self::new(hash, &rest[1..])
    }

    /// Index entry pointing at this row
    pub fn index_key(&self) -> VersionIndexKey {
        VersionIndexKey {
            model_version: self.model_version.clone(),
            content_hash: self.content_hash.clone(),
        }
    }
}

/// Key for the model-version index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionIndexKey {
    pub model_version: String,
    pub content_hash: String,
}

impl VersionIndexKey {
    /// Encode key to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Self::prefix(&self.model_version);
        bytes.extend_from_slice(self.content_hash.as_bytes());
        bytes
    }

    /// Prefix shared by every row of one model version
    pub fn prefix(model_version: &str) -> Vec<u8> {
        let mut bytes = model_version.as_bytes().to_vec();
        bytes.push(0);
        bytes
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() <= CONTENT_HASH_LEN + 1 {
            return Err(StorageError::Key("version index key too short".to_string()));
        }
        let split = bytes.len() - CONTENT_HASH_LEN;
        if bytes[split - 1] != 0 {
            return Err(StorageError::Key("missing version separator".to_string()));
        }
        let model_version = std::str::from_utf8(&bytes[..split - 1])
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        let content_hash = std::str::from_utf8(&bytes[split..])
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        let key = EmbeddingKey::new(content_hash, model_version)?;
        Ok(key.index_key())
    }

    /// The row this index entry points at
    pub fn row_key(&self) -> EmbeddingKey {
        EmbeddingKey {
            content_hash: self.content_hash.clone(),
            model_version: self.model_version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u64) -> String {
        format!("{:064x}", n)
    }

    #[test]
    fn test_embedding_key_roundtrip() {
        let key = EmbeddingKey::new(hash(7), "minilm:v2").unwrap();
        let decoded = EmbeddingKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.model_version, "minilm:v2");
    }

    #[test]
    fn test_rejects_malformed_hash() {
        assert!(EmbeddingKey::new("abc", "v1").is_err());
        assert!(EmbeddingKey::new("A".repeat(64), "v1").is_err());
        assert!(EmbeddingKey::new(hash(1), "").is_err());
    }

    #[test]
    fn test_hash_prefix_matches_all_versions() {
        let a = EmbeddingKey::new(hash(3), "v1").unwrap();
        let b = EmbeddingKey::new(hash(3), "v2").unwrap();
        let prefix = EmbeddingKey::hash_prefix(&hash(3));
        assert!(a.to_bytes().starts_with(&prefix));
        assert!(b.to_bytes().starts_with(&prefix));
    }

    #[test]
    fn test_version_index_roundtrip() {
        let key = EmbeddingKey::new(hash(42), "v1").unwrap();
        let index = key.index_key();
        let decoded = VersionIndexKey::from_bytes(&index.to_bytes()).unwrap();
        assert_eq!(decoded, index);
        assert_eq!(decoded.row_key(), key);
    }

    #[test]
    fn test_version_prefix_does_not_match_longer_version() {
        let key = EmbeddingKey::new(hash(1), "v10").unwrap().index_key();
        assert!(!key.to_bytes().starts_with(&VersionIndexKey::prefix("v1")));
    }
}
