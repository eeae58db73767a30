//! Command implementations for embedctl.
//!
//! Every handler returns the text to print so the binary stays a thin
//! dispatcher and handlers can be exercised against a temp database.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use embedding_cache::{
    content_hash, BatchOptions, CachedBatchEmbedder, EmbedError, EmbedOptions, EmbeddingCache,
};
use embedding_model::{BatchEmbedder, BatchProgress, LoadProgress, ModelCache, ModelCoordinator};
use embedding_storage::Storage;
use embedding_types::Settings;

use crate::cli::{Cli, Commands};

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(db_path) = db_path_override {
        settings.db_path = db_path.to_string();
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Install the global subscriber. Logs go to stderr so stdout stays JSON.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Open the cache database, creating parent directories if needed.
pub fn open_storage(settings: &Settings) -> Result<Arc<Storage>> {
    let db_path = settings.expanded_db_path();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    info!("Opening storage at {:?}", db_path);
    let storage = Storage::open(&db_path).context("Failed to open storage")?;
    Ok(Arc::new(storage))
}

/// Cache over `storage` scoped to the configured model version.
pub fn open_cache(settings: &Settings, storage: Arc<Storage>) -> Arc<EmbeddingCache> {
    Arc::new(EmbeddingCache::new(storage, settings.model_version.as_str()))
}

fn coordinator(settings: &Settings) -> Arc<ModelCoordinator> {
    let cache = ModelCache::new(
        settings.expanded_model_cache_dir(),
        settings.model_repo.as_str(),
    );
    Arc::new(ModelCoordinator::candle(cache))
}

fn cached_embedder(settings: &Settings, storage: Arc<Storage>) -> CachedBatchEmbedder {
    let embedder = BatchEmbedder::new(coordinator(settings), settings.dimensions);
    CachedBatchEmbedder::new(embedder, open_cache(settings, storage))
}

/// Parse settings, set up logging and run the selected command.
pub async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(
        cli.config.as_deref(),
        cli.db_path.as_deref(),
        cli.log_level.as_deref(),
    )?;
    init_logging(&settings.log_level)?;

    let output = dispatch(&settings, cli.command).await?;
    println!("{output}");
    Ok(())
}

/// Run one command. Storage is opened only by commands that touch the cache.
async fn dispatch(settings: &Settings, command: Commands) -> Result<String> {
    match command {
        Commands::Embed {
            texts,
            no_cache,
            batch_size,
            raw,
        } => {
            let storage = open_storage(settings)?;
            let embedder = cached_embedder(settings, Arc::clone(&storage));
            let options = BatchOptions {
                use_cache: !no_cache,
                batch_size: batch_size.unwrap_or(settings.batch_size),
                normalize: settings.normalize && !raw,
            };
            flushed(&storage, embed(&embedder, &texts, options).await)
        }
        Commands::Stats => {
            let storage = open_storage(settings)?;
            stats(&open_cache(settings, Arc::clone(&storage)), &storage)
        }
        Commands::Clear => {
            let storage = open_storage(settings)?;
            flushed(&storage, clear(&open_cache(settings, Arc::clone(&storage))))
        }
        Commands::ClearStale => {
            let storage = open_storage(settings)?;
            flushed(&storage, clear_stale(&open_cache(settings, Arc::clone(&storage))))
        }
        Commands::Invalidate { text } => {
            let storage = open_storage(settings)?;
            flushed(&storage, invalidate(&open_cache(settings, Arc::clone(&storage)), &text))
        }
        Commands::Similarity { a, b } => {
            let storage = open_storage(settings)?;
            let embedder = cached_embedder(settings, Arc::clone(&storage));
            flushed(&storage, similarity(&embedder, &a, &b).await)
        }
        Commands::Hash { text } => Ok(content_hash(&text)),
        Commands::ModelInfo => model_info(settings).await,
    }
}

/// Flush writes to disk once a command has succeeded.
fn flushed(storage: &Storage, output: Result<String>) -> Result<String> {
    let output = output?;
    storage.flush().context("Failed to flush storage")?;
    Ok(output)
}

/// Embed `texts`, printing one JSON array of vectors.
///
/// Storage errors abort the command: a cache that cannot be read or written
/// is reported rather than silently bypassed.
pub async fn embed(
    embedder: &CachedBatchEmbedder,
    texts: &[String],
    options: BatchOptions,
) -> Result<String> {
    let report = |p: BatchProgress| {
        debug!(
            current = p.current,
            total = p.total,
            percentage = p.percentage,
            "Embedding progress"
        );
    };
    let embeddings = embedder
        .embed_many_cached(texts, options, Some(&report))
        .await
        .inspect_err(|e| {
            if let EmbedError::Model(model_err) = e {
                if model_err.is_load_failure() {
                    warn!("Model could not be loaded; check model_cache_dir and network access");
                }
            }
        })
        .context("Failed to embed texts")?;

    let vectors: Vec<&Vec<f32>> = embeddings.iter().map(|e| &e.values).collect();
    Ok(serde_json::to_string(&vectors)?)
}

/// Cache counters for the active version plus row counts for every version.
pub fn stats(cache: &EmbeddingCache, storage: &Storage) -> Result<String> {
    let cache_stats = cache.stats().context("Failed to read cache statistics")?;
    let storage_stats = storage
        .get_stats()
        .context("Failed to read storage statistics")?;
    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "cache": cache_stats,
        "storage": storage_stats,
    }))?)
}

pub fn clear(cache: &EmbeddingCache) -> Result<String> {
    let deleted = cache.clear_current().context("Failed to clear cache")?;
    Ok(deleted.to_string())
}

pub fn clear_stale(cache: &EmbeddingCache) -> Result<String> {
    let deleted = cache.clear_stale().context("Failed to clear stale entries")?;
    Ok(deleted.to_string())
}

pub fn invalidate(cache: &EmbeddingCache, text: &str) -> Result<String> {
    let removed = cache.invalidate(text).context("Failed to invalidate entry")?;
    Ok(removed.to_string())
}

pub async fn similarity(embedder: &CachedBatchEmbedder, a: &str, b: &str) -> Result<String> {
    let first = embedder
        .embed_one_cached(a, EmbedOptions::default())
        .await
        .context("Failed to embed first text")?;
    let second = embedder
        .embed_one_cached(b, EmbedOptions::default())
        .await
        .context("Failed to embed second text")?;
    let score = first.cosine_similarity(&second)?;
    Ok(format!("{score:.6}"))
}

async fn model_info(settings: &Settings) -> Result<String> {
    let coordinator = coordinator(settings);
    let model = coordinator
        .acquire(Some(Arc::new(|p: LoadProgress| info!(?p, "Model load"))))
        .await
        .context("Failed to load embedding model")?;
    Ok(serde_json::to_string_pretty(model.info())?)
}
