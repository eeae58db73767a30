//! Column family definitions for RocksDB.
//!
//! - embeddings: raw little-endian f32 blobs keyed by (hash, version)
//! - embedding_meta: JSON row metadata under the same key
//! - embedding_versions: secondary index `{version}\0{hash}` for bulk
//!   scans and deletes by model version

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for vector blobs
pub const CF_EMBEDDINGS: &str = "embeddings";

/// Column family name for per-row metadata
pub const CF_EMBEDDING_META: &str = "embedding_meta";

/// Column family name for the model-version index
pub const CF_EMBEDDING_VERSIONS: &str = "embedding_versions";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_EMBEDDINGS, CF_EMBEDDING_META, CF_EMBEDDING_VERSIONS];

/// Vector blobs are dense floats; LZ4 keeps reads cheap
fn embeddings_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_EMBEDDINGS, embeddings_options()),
        ColumnFamilyDescriptor::new(CF_EMBEDDING_META, Options::default()),
        ColumnFamilyDescriptor::new(CF_EMBEDDING_VERSIONS, Options::default()),
    ]
}
