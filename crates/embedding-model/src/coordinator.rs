//! Lazy, single-flight model loading.
//!
//! [`ModelCoordinator`] owns the one shared model instance. The first caller
//! of [`ModelCoordinator::acquire`] performs the load on a blocking thread;
//! callers arriving meanwhile park on a [`Notify`] until the state leaves
//! `Loading`, then share the handle or the stored failure.
//!
//! ```text
//!  Unloaded ──acquire──▶ Loading ──ok──▶ Ready(handle)
//!      ▲                    │
//!      │                    └──err──▶ Failed(msg)   (sticky)
//!      └──────────── unload() ◀──────────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::candle::{model_name, CandleEmbedder};
use crate::error::EmbeddingError;
use crate::model::EmbeddingModel;
use crate::model_cache::{get_or_download_model, ModelCache};

/// Shared handle to a loaded model.
pub type ModelHandle = Arc<dyn EmbeddingModel>;

/// Optional observer for load progress.
pub type ProgressSink = Arc<dyn Fn(LoadProgress) + Send + Sync>;

/// Progress notifications emitted while a model loads.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadProgress {
    /// A model file is being fetched
    Downloading { file: String },
    /// Weights are being read into memory
    Loading,
    /// The model is ready for inference
    Ready { model: String, dimension: usize },
    /// The load failed
    Error { message: String },
}

/// Builds a model. Called at most once per loaded lifetime.
///
/// `load` runs on a blocking thread and may do network and disk I/O.
pub trait ModelLoader: Send + Sync + 'static {
    fn load(&self, progress: &dyn Fn(LoadProgress)) -> Result<ModelHandle, EmbeddingError>;
}

/// Loads all-MiniLM-L6-v2 through Candle, downloading files on first use.
#[derive(Debug, Clone, Default)]
pub struct CandleLoader {
    cache: ModelCache,
}

impl CandleLoader {
    pub fn new(cache: ModelCache) -> Self {
        Self { cache }
    }
}

impl ModelLoader for CandleLoader {
    fn load(&self, progress: &dyn Fn(LoadProgress)) -> Result<ModelHandle, EmbeddingError> {
        let paths = get_or_download_model(&self.cache, &|file| {
            progress(LoadProgress::Downloading {
                file: file.to_string(),
            })
        })?;
        progress(LoadProgress::Loading);
        let embedder =
            CandleEmbedder::load_from_paths(model_name(&self.cache.repo_id), &paths)?;
        Ok(Arc::new(embedder))
    }
}

/// Observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

enum LoadState {
    Unloaded,
    Loading,
    Ready(ModelHandle),
    Failed(String),
}

struct Inner {
    state: LoadState,
    /// Bumped by `unload()` so a load started before it cannot publish.
    generation: u64,
}

/// Owns the shared model and serializes its initialization.
pub struct ModelCoordinator {
    loader: Arc<dyn ModelLoader>,
    inner: Mutex<Inner>,
    changed: Notify,
}

impl ModelCoordinator {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            inner: Mutex::new(Inner {
                state: LoadState::Unloaded,
                generation: 0,
            }),
            changed: Notify::new(),
        }
    }

    /// Coordinator backed by the Candle model stored under `cache`.
    pub fn candle(cache: ModelCache) -> Self {
        Self::new(Arc::new(CandleLoader::new(cache)))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the shared model, loading it if nobody has yet.
    ///
    /// Concurrent callers coalesce onto one load. A failed load is replayed
    /// as [`EmbeddingError::LoadFailure`] until [`unload`](Self::unload).
    pub async fn acquire(
        &self,
        progress: Option<ProgressSink>,
    ) -> Result<ModelHandle, EmbeddingError> {
        let mut waited = false;
        loop {
            // Created before inspecting state so a transition between the
            // check and the await still wakes us.
            let notified = self.changed.notified();

            let claimed = {
                let mut inner = self.lock();
                match &inner.state {
                    LoadState::Ready(handle) => {
                        let handle = Arc::clone(handle);
                        drop(inner);
                        if waited {
                            emit(&progress, ready_event(&handle));
                        }
                        return Ok(handle);
                    }
                    LoadState::Failed(message) => {
                        let message = message.clone();
                        drop(inner);
                        if waited {
                            emit(&progress, LoadProgress::Error {
                                message: message.clone(),
                            });
                        }
                        return Err(EmbeddingError::LoadFailure(message));
                    }
                    LoadState::Loading => None,
                    LoadState::Unloaded => {
                        inner.state = LoadState::Loading;
                        Some(inner.generation)
                    }
                }
            };

            match claimed {
                Some(generation) => return self.load(generation, progress).await,
                None => {
                    debug!("Model load in flight, waiting");
                    waited = true;
                    notified.await;
                }
            }
        }
    }

    async fn load(
        &self,
        generation: u64,
        progress: Option<ProgressSink>,
    ) -> Result<ModelHandle, EmbeddingError> {
        let mut guard = LoadGuard {
            coordinator: self,
            generation,
            armed: true,
        };

        info!("Initializing embedding model");
        let loader = Arc::clone(&self.loader);
        let sink = progress.clone();
        let result = tokio::task::spawn_blocking(move || loader.load(&|event| emit(&sink, event)))
            .await
            .map_err(|e| EmbeddingError::LoadFailure(format!("model loader task failed: {e}")))
            .and_then(|loaded| loaded.map_err(|e| EmbeddingError::LoadFailure(e.to_string())));
        guard.armed = false;

        {
            let mut inner = self.lock();
            if inner.generation == generation {
                inner.state = match &result {
                    Ok(handle) => LoadState::Ready(Arc::clone(handle)),
                    Err(EmbeddingError::LoadFailure(message)) => LoadState::Failed(message.clone()),
                    Err(other) => LoadState::Failed(other.to_string()),
                };
            } else {
                debug!(generation, "Model unloaded during load; result not published");
            }
        }
        self.changed.notify_waiters();

        match &result {
            Ok(handle) => {
                let info = handle.info();
                info!(model = %info.name, dim = info.dimension, "Embedding model ready");
                emit(&progress, ready_event(handle));
            }
            Err(e) => {
                warn!(error = %e, "Embedding model failed to load");
                emit(&progress, LoadProgress::Error {
                    message: e.to_string(),
                });
            }
        }
        result
    }

    /// Load the model ahead of first use.
    pub async fn preload(&self) -> Result<(), EmbeddingError> {
        self.acquire(None).await.map(|_| ())
    }

    /// Drop the model and any stored failure so the next acquire reloads.
    pub fn unload(&self) {
        let previous = {
            let mut inner = self.lock();
            inner.generation += 1;
            std::mem::replace(&mut inner.state, LoadState::Unloaded)
        };
        self.changed.notify_waiters();
        if !matches!(previous, LoadState::Unloaded) {
            info!("Embedding model unloaded");
        }
    }

    pub fn state(&self) -> ModelState {
        match self.lock().state {
            LoadState::Unloaded => ModelState::Unloaded,
            LoadState::Loading => ModelState::Loading,
            LoadState::Ready(_) => ModelState::Ready,
            LoadState::Failed(_) => ModelState::Failed,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == ModelState::Ready
    }
}

impl std::fmt::Debug for ModelCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCoordinator")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Returns the coordinator to `Unloaded` if the loading future is dropped
/// before it publishes a result.
struct LoadGuard<'a> {
    coordinator: &'a ModelCoordinator,
    generation: u64,
    armed: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut inner = self.coordinator.lock();
            if inner.generation == self.generation && matches!(inner.state, LoadState::Loading) {
                inner.state = LoadState::Unloaded;
            }
        }
        self.coordinator.changed.notify_waiters();
    }
}

fn emit(sink: &Option<ProgressSink>, event: LoadProgress) {
    if let Some(sink) = sink {
        sink(event);
    }
}

fn ready_event(handle: &ModelHandle) -> LoadProgress {
    let info = handle.info();
    LoadProgress::Ready {
        model: info.name.clone(),
        dimension: info.dimension,
    }
}
