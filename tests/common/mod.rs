#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;
use docqa_backend::core::config::AppConfig;
use docqa_backend::core::errors::RagError;
use docqa_backend::llm::{CheckedEmbedder, EmbeddingProvider, GenerationProvider, Prompt};
use docqa_backend::rag::RagEngine;

pub const TOPICS: [&str; 3] = ["rust", "ocean", "music"];
pub const POISON: &str = "POISON";

/// Embeds text as keyword counts over [`TOPICS`], plus an "other" axis
/// for text that mentions none of them.
pub struct KeywordEmbedder {
    pub extra_dims: usize,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            extra_dims: 0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_extra_dims(extra_dims: usize) -> Self {
        Self {
            extra_dims,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = TOPICS
            .iter()
            .map(|topic| lower.matches(topic).count() as f32)
            .collect();
        let other = if vector.iter().all(|v| *v == 0.0) { 1.0 } else { 0.0 };
        vector.push(other);
        vector.extend(std::iter::repeat(0.0).take(self.extra_dims));
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector(text))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if texts.iter().any(|t| t.contains(POISON)) {
            return Err(RagError::embedding_unavailable("connection reset by peer"));
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// [`KeywordEmbedder`] whose single-text `embed` parks on texts containing
/// [`GatedEmbedder::HOLD`] until released.
pub struct GatedEmbedder {
    inner: KeywordEmbedder,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedEmbedder {
    pub const HOLD: &'static str = "hold";

    pub fn new() -> Self {
        Self {
            inner: KeywordEmbedder::new(),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GatedEmbedder {
    fn name(&self) -> &str {
        "gated"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        if text.contains(Self::HOLD) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.embed(text).await
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.inner.embed_many(texts).await
    }
}

/// Answers with the number of context blocks it was given.
#[derive(Default)]
pub struct CountingGenerator {
    pub calls: AtomicUsize,
}

impl CountingGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for CountingGenerator {
    fn name(&self) -> &str {
        "counting"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let blocks = prompt.user.matches("\n\n").count();
        Ok(format!("answered with {} separators", blocks))
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.provider.embed_batch_size = 2;
    config
}

pub fn topic_text(topic: &str, chars: usize) -> String {
    let unit = format!("{} ", topic);
    unit.repeat(chars / unit.len() + 1).chars().take(chars).collect()
}

pub async fn open_engine(
    config: &AppConfig,
    dir: &std::path::Path,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<CountingGenerator>,
) -> RagEngine {
    let checked = CheckedEmbedder::probe(embedder, config.provider.embed_batch_size)
        .await
        .unwrap();
    RagEngine::open(config, dir.to_path_buf(), checked, generator)
        .await
        .unwrap()
}
