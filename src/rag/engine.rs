//! Question-answering engine over a single document corpus.
//!
//! State is `Empty` until an ingest succeeds, then `Ready` until cleared.
//! Ingest and clear are serialized by a writer lock; asks run against the
//! index snapshot current when they start and never observe a half-built
//! corpus.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use super::chunker::Chunker;
use super::index::SqliteIndex;
use super::retriever::{RetrievalParams, Retriever};
use super::synthesizer::Synthesizer;
use crate::core::config::{AppConfig, RetrievalConfig};
use crate::core::errors::RagError;
use crate::document::Document;
use crate::llm::{CheckedEmbedder, GenerationProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Empty,
    Ready,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub chunk_count: usize,
    pub embedding_dimension: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub source: String,
    pub chunks: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AskOutcome {
    pub answer: String,
    pub context_found: bool,
    pub num_chunks_retrieved: usize,
}

pub struct RagEngine {
    index_dir: PathBuf,
    embedding_model: String,
    chunker: Chunker,
    embedder: CheckedEmbedder,
    synthesizer: Synthesizer,
    retrieval_defaults: RetrievalConfig,
    index: RwLock<Option<Arc<SqliteIndex>>>,
    writer: Mutex<()>,
}

impl RagEngine {
    /// Builds the engine and reopens a persisted index from `index_dir`
    /// when its dimension matches the probed embedder.
    pub async fn open(
        config: &AppConfig,
        index_dir: PathBuf,
        embedder: CheckedEmbedder,
        generator: Arc<dyn GenerationProvider>,
    ) -> Result<Self, RagError> {
        let chunker = Chunker::from_config(&config.chunking)?;
        let index = load_persisted(&index_dir, embedder.dimension()).await;

        Ok(Self {
            index_dir,
            embedding_model: config.provider.embedding_model.clone(),
            chunker,
            embedder,
            synthesizer: Synthesizer::new(generator, config.prompt.clone()),
            retrieval_defaults: config.retrieval,
            index: RwLock::new(index.map(Arc::new)),
            writer: Mutex::new(()),
        })
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn retrieval_defaults(&self) -> RetrievalConfig {
        self.retrieval_defaults
    }

    pub async fn state(&self) -> EngineState {
        if self.index.read().await.is_some() {
            EngineState::Ready
        } else {
            EngineState::Empty
        }
    }

    pub async fn status(&self) -> Result<EngineStatus, RagError> {
        let guard = self.index.read().await;
        let status = match guard.as_ref() {
            Some(index) => EngineStatus {
                state: EngineState::Ready,
                chunk_count: index.count().await?,
                embedding_dimension: index.dimension(),
                indexed_at: Some(index.meta().created_at.clone()),
            },
            None => EngineStatus {
                state: EngineState::Empty,
                chunk_count: 0,
                embedding_dimension: self.embedder.dimension(),
                indexed_at: None,
            },
        };
        Ok(status)
    }

    /// Replaces the corpus with `document`.
    ///
    /// Nothing becomes visible to queries unless every chunk was embedded
    /// and stored; on failure the previous corpus stays active.
    pub async fn ingest(&self, document: Document) -> Result<IngestOutcome, RagError> {
        let _writer = self.writer.lock().await;

        tracing::info!(
            source = %document.source,
            pages = document.page_count(),
            chars = document.total_chars(),
            "Starting ingestion"
        );

        let chunks = self.chunker.split_document(&document);
        if chunks.is_empty() {
            return Err(RagError::Document(format!(
                "no text could be extracted from {}",
                document.source
            )));
        }
        tracing::info!("Created {} chunks from document", chunks.len());
        if let Some(first) = chunks.first() {
            let preview: String = first.text.chars().take(100).collect();
            tracing::debug!("Example chunk content: {}...", preview);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_many(&texts).await.map_err(|e| {
            tracing::error!("Embedding failed, keeping previous index: {}", e);
            e
        })?;

        let items = chunks.into_iter().zip(vectors).collect::<Vec<_>>();
        let count = items.len();
        let built = SqliteIndex::build(
            &self.index_dir,
            &self.embedding_model,
            self.embedder.dimension(),
            items,
        )
        .await?;

        *self.index.write().await = Some(Arc::new(built));

        tracing::info!(source = %document.source, chunks = count, "Ingestion completed");

        Ok(IngestOutcome {
            source: document.source,
            chunks: count,
        })
    }

    /// Answers `query` from the active corpus using a retriever built for
    /// exactly these parameters.
    pub async fn ask(&self, query: &str, k: usize, score_threshold: f32) -> Result<AskOutcome, RagError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidQuery("query must not be empty".to_string()));
        }
        let params = RetrievalParams::new(k, score_threshold)?;

        tracing::info!(k, score_threshold, "Retrieving context for query: {}", query);

        let index = self.index.read().await.clone().ok_or(RagError::NoIndex)?;
        let retrieved = Retriever::new(index, &self.embedder, params)
            .retrieve(query)
            .await?;

        let answer = self.synthesizer.synthesize(query, &retrieved).await?;

        Ok(AskOutcome {
            answer,
            context_found: !retrieved.is_empty(),
            num_chunks_retrieved: retrieved.len(),
        })
    }

    /// Drops the active corpus and its file. Succeeds in any state.
    pub async fn clear(&self) {
        let writer = self.writer.lock().await;
        self.clear_paused(&writer).await;
    }

    /// [`clear`](Self::clear) for a caller already holding the guard from
    /// [`pause_writes`](Self::pause_writes).
    pub async fn clear_paused(&self, _writer: &MutexGuard<'_, ()>) {
        let previous = self.index.write().await.take();
        if let Some(index) = previous {
            if let Ok(index) = Arc::try_unwrap(index) {
                index.close().await;
            }
        }

        if let Err(e) = SqliteIndex::remove(&self.index_dir).await {
            tracing::warn!("Failed to delete index file: {}", e);
        }

        tracing::info!("Cleared vector store and retriever");
    }

    /// Blocks ingest and clear until the guard is dropped, so the index
    /// directory can be read as a consistent whole.
    pub async fn pause_writes(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }
}

async fn load_persisted(index_dir: &Path, dimension: usize) -> Option<SqliteIndex> {
    SqliteIndex::remove_stale_staging(index_dir).await;

    match SqliteIndex::open_existing(index_dir).await {
        Ok(Some(index)) if index.dimension() == dimension => {
            tracing::info!(
                path = %index.path().display(),
                dimension,
                "Reopened persisted index"
            );
            Some(index)
        }
        Ok(Some(index)) => {
            tracing::warn!(
                stored = index.dimension(),
                probed = dimension,
                "Persisted index was built with a different embedding dimension; starting empty"
            );
            index.close().await;
            None
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Failed to open persisted index, starting empty: {}", e);
            None
        }
    }
}
