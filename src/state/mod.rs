use std::sync::Arc;

use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::core::errors::RagError;
use crate::llm::{CheckedEmbedder, EmbeddingProvider, GenerationProvider, OllamaProvider};
use crate::rag::RagEngine;
use crate::storage::{StorageSyncManager, SyncOutcome};

pub mod error;

use error::InitializationError;

/// Application state shared across all routes and the shutdown hook.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: Arc<RagEngine>,
    pub sync: Option<Arc<StorageSyncManager>>,
}

impl AppState {
    /// Loads configuration for `paths` and initializes against Ollama.
    pub async fn initialize(paths: AppPaths) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone()).load()?;
        let ollama = Arc::new(
            OllamaProvider::new(&config.provider)
                .map_err(|e| InitializationError::Provider(e.into()))?,
        );
        tracing::info!(
            base_url = ollama.base_url(),
            embedding_model = %config.provider.embedding_model,
            generation_model = %config.provider.generation_model,
            "Using Ollama provider"
        );

        Self::initialize_with(paths, config, ollama.clone(), ollama).await
    }

    /// Initializes the application state with explicit providers.
    ///
    /// Order matters:
    /// 1. Probe the embedding provider; failure aborts startup
    /// 2. Restore the index directory from the object store, if configured
    /// 3. Open the engine over whatever the directory now holds
    pub async fn initialize_with(
        paths: AppPaths,
        config: AppConfig,
        embedding: Arc<dyn EmbeddingProvider>,
        generation: Arc<dyn GenerationProvider>,
    ) -> Result<Arc<Self>, InitializationError> {
        let embedder = CheckedEmbedder::probe(embedding, config.provider.embed_batch_size)
            .await
            .map_err(InitializationError::EmbeddingProbe)?;

        let index_dir = paths.resolve(&config.index.dir);

        let sync = StorageSyncManager::from_config(&config.storage, index_dir.clone())
            .map_err(InitializationError::Storage)?
            .map(Arc::new);

        if let Some(sync) = &sync {
            sync.ensure_bucket()
                .await
                .map_err(InitializationError::Storage)?;

            if config.storage.restore_on_startup {
                match sync.restore().await {
                    Ok(SyncOutcome::Completed) => {
                        tracing::info!("Successfully restored index from object store")
                    }
                    Ok(outcome) => tracing::info!("{}", outcome.message()),
                    Err(e) => tracing::error!("Failed to restore index, keeping local state: {}", e),
                }
            }
        }

        tokio::fs::create_dir_all(&index_dir)
            .await
            .map_err(|e| InitializationError::Engine(RagError::index(e)))?;

        let engine = RagEngine::open(&config, index_dir, embedder, generation)
            .await
            .map_err(InitializationError::Engine)?;

        Ok(Arc::new(AppState {
            config: Arc::new(config),
            engine: Arc::new(engine),
            sync,
        }))
    }

    /// Clears the engine and deletes the remote backup with it. Storage
    /// failures are logged; clearing always succeeds.
    pub async fn clear(&self) {
        let Some(sync) = &self.sync else {
            self.engine.clear().await;
            return;
        };

        let paused = self.engine.pause_writes().await;
        self.engine.clear_paused(&paused).await;
        if let Err(e) = sync.discard_archive().await {
            tracing::error!("Failed to delete index backup after clear: {}", e);
        }
    }

    /// Backs the index up if storage sync is enabled for shutdown.
    pub async fn shutdown(&self) {
        let Some(sync) = &self.sync else {
            return;
        };
        if !self.config.storage.backup_on_shutdown {
            return;
        }

        let _paused = self.engine.pause_writes().await;
        match sync.backup().await {
            Ok(outcome) => tracing::info!("Shutdown backup: {}", outcome.message()),
            Err(e) => tracing::error!("Shutdown backup failed: {}", e),
        }
    }
}
