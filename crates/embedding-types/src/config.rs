//! Configuration loading for the embedding cache.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/local-embeddings/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

const APP_NAME: &str = "local-embeddings";

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the RocksDB directory holding cached vectors
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Writable directory for downloaded model files
    #[serde(default = "default_model_cache_dir")]
    pub model_cache_dir: String,

    /// HuggingFace repository the model is fetched from
    #[serde(default = "default_model_repo")]
    pub model_repo: String,

    /// Identifier stamped on every cached vector.
    /// Changing it hides older rows until `clear-stale` reclaims them.
    #[serde(default = "default_model_version")]
    pub model_version: String,

    /// Dimensionality the model is expected to produce
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Number of texts handed to the model per invocation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Rescale vectors to unit length
    #[serde(default = "default_normalize")]
    pub normalize: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

fn default_db_path() -> String {
    project_dirs()
        .map(|p| p.data_local_dir().join("embeddings-db"))
        .unwrap_or_else(|| PathBuf::from("./embeddings-db"))
        .to_string_lossy()
        .to_string()
}

fn default_model_cache_dir() -> String {
    project_dirs()
        .map(|p| p.cache_dir().join("models"))
        .unwrap_or_else(|| PathBuf::from(".cache/models"))
        .to_string_lossy()
        .to_string()
}

fn default_model_repo() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_model_version() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_batch_size() -> usize {
    32
}

fn default_normalize() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            model_cache_dir: default_model_cache_dir(),
            model_repo: default_model_repo(),
            model_version: default_model_version(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
            normalize: default_normalize(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/local-embeddings/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (EMBED_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = project_dirs()
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())?
            .set_default("model_cache_dir", default_model_cache_dir())?
            .set_default("model_repo", default_model_repo())?
            .set_default("model_version", default_model_version())?
            .set_default("dimensions", default_dimensions() as i64)?
            .set_default("batch_size", default_batch_size() as i64)?
            .set_default("normalize", default_normalize())?
            .set_default("log_level", default_log_level())?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // EMBED_DB_PATH, EMBED_MODEL_VERSION, EMBED_BATCH_SIZE, ...
        builder = builder.add_source(
            Environment::with_prefix("EMBED")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the embedding pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimensions == 0 {
            return Err(ConfigError::Invalid {
                field: "dimensions",
                reason: "must be > 0".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_size",
                reason: "must be > 0".to_string(),
            });
        }
        if self.model_version.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "model_version",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Expand ~ in model_cache_dir to the home directory
    pub fn expanded_model_cache_dir(&self) -> PathBuf {
        expand_home(&self.model_cache_dir)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(base) = directories::BaseDirs::new() {
            return base.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.dimensions, 384);
        assert_eq!(settings.batch_size, 32);
        assert_eq!(settings.model_version, "all-MiniLM-L6-v2");
        assert!(settings.normalize);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert!(!settings.model_repo.is_empty());
        assert!(settings.dimensions > 0);
    }

    #[test]
    fn test_load_from_cli_file() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "model_version = \"test-model-v2\"").unwrap();
        writeln!(file, "batch_size = 8").unwrap();

        let path = file.path().to_string_lossy().to_string();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.model_version, "test-model-v2");
        assert_eq!(settings.batch_size, 8);
    }

    #[test]
    fn test_missing_cli_file_is_error() {
        let result = Settings::load(Some("/nonexistent/embedctl-config.toml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        settings.dimensions = 0;
        assert!(settings.validate().is_err());

        settings.dimensions = 384;
        settings.batch_size = 0;
        assert!(settings.validate().is_err());

        settings.batch_size = 4;
        settings.model_version = "  ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_expand_home() {
        let settings = Settings {
            db_path: "/var/lib/embeddings".to_string(),
            ..Default::default()
        };
        assert_eq!(
            settings.expanded_db_path(),
            PathBuf::from("/var/lib/embeddings")
        );
    }

    #[test]
    fn test_settings_serialization() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let decoded: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.model_version, settings.model_version);
        assert_eq!(decoded.dimensions, settings.dimensions);
    }
}
