//! On-disk model files.
//!
//! Files are fetched from the HuggingFace Hub once and kept in a writable
//! directory, one subdirectory per repository. The hub client's own cache is
//! pointed inside the same directory so nothing is written elsewhere.

use std::fs;
use std::path::{Path, PathBuf};

use hf_hub::api::sync::ApiBuilder;
use tracing::{debug, info};

use crate::error::EmbeddingError;

pub const DEFAULT_MODEL_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Every file a BERT model needs
pub const MODEL_FILES: &[&str] = &[CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE];

/// Hub client scratch space, relative to the cache root
const HUB_DIR: &str = ".hub";

/// Location of one repository's files under a cache root.
#[derive(Debug, Clone)]
pub struct ModelCache {
    pub cache_dir: PathBuf,
    pub repo_id: String,
}

impl Default for ModelCache {
    fn default() -> Self {
        let root = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
        Self::new(root.join("local-embeddings").join("models"), DEFAULT_MODEL_REPO)
    }
}

impl ModelCache {
    pub fn new(cache_dir: impl Into<PathBuf>, repo_id: impl Into<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            repo_id: repo_id.into(),
        }
    }

    /// `org/name` becomes `org_name` so each repo gets one flat directory.
    pub fn model_dir(&self) -> PathBuf {
        self.cache_dir.join(self.repo_id.replace('/', "_"))
    }

    pub fn paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir())
    }

    pub fn is_cached(&self) -> bool {
        self.missing_files().is_empty()
    }

    pub fn missing_files(&self) -> Vec<&'static str> {
        let dir = self.model_dir();
        MODEL_FILES
            .iter()
            .copied()
            .filter(|name| !dir.join(name).is_file())
            .collect()
    }

    /// Make sure every model file is present, downloading what is missing.
    ///
    /// `on_download` sees each file name just before it is fetched.
    pub fn ensure(&self, on_download: &dyn Fn(&str)) -> Result<ModelPaths, EmbeddingError> {
        let missing = self.missing_files();
        if missing.is_empty() {
            debug!(dir = ?self.model_dir(), "Model files present");
            return Ok(self.paths());
        }

        info!(repo = %self.repo_id, files = missing.len(), "Fetching model files");
        let api = ApiBuilder::new()
            .with_cache_dir(self.cache_dir.join(HUB_DIR))
            .with_progress(false)
            .build()
            .map_err(|e| EmbeddingError::Download(e.to_string()))?;
        let repo = api.model(self.repo_id.clone());

        let dir = self.model_dir();
        fs::create_dir_all(&dir)?;
        for name in missing {
            on_download(name);
            let fetched = repo
                .get(name)
                .map_err(|e| EmbeddingError::Download(format!("{name}: {e}")))?;
            install(&fetched, &dir.join(name))?;
        }
        Ok(self.paths())
    }
}

/// Paths to the three model files
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

impl ModelPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join(CONFIG_FILE),
            tokenizer: dir.join(TOKENIZER_FILE),
            weights: dir.join(WEIGHTS_FILE),
        }
    }
}

/// Shorthand for [`ModelCache::ensure`].
pub fn get_or_download_model(
    cache: &ModelCache,
    on_download: &dyn Fn(&str),
) -> Result<ModelPaths, EmbeddingError> {
    cache.ensure(on_download)
}

/// Copy next to the destination, then rename, so a crash never leaves a
/// truncated file that `missing_files` would accept.
fn install(source: &Path, dest: &Path) -> Result<(), EmbeddingError> {
    let partial = dest.with_extension("partial");
    fs::copy(source, &partial)?;
    fs::rename(&partial, dest)?;
    debug!(file = ?dest, "Installed model file");
    Ok(())
}
