//! Dimension-checked embedding access.
//!
//! The provider is probed once at startup; the dimension observed there is
//! the contract for every later call. A change means the model behind the
//! provider was swapped, which invalidates every stored vector.

use std::sync::Arc;

use super::provider::EmbeddingProvider;
use crate::core::errors::{EmbeddingFailure, RagError};

pub const PROBE_TEXT: &str = "test query";

#[derive(Clone)]
pub struct CheckedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    batch_size: usize,
}

impl CheckedEmbedder {
    /// Embeds [`PROBE_TEXT`] and records its dimension.
    pub async fn probe(
        inner: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Result<Self, RagError> {
        let vector = inner.embed(PROBE_TEXT).await?;
        if vector.is_empty() {
            return Err(EmbeddingFailure::EmptyVector.into());
        }

        tracing::info!(
            provider = inner.name(),
            dimension = vector.len(),
            "Embedding test successful"
        );

        Ok(Self {
            inner,
            dimension: vector.len(),
            batch_size: batch_size.max(1),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check(&self, vector: &[f32]) -> Result<(), RagError> {
        if vector.len() != self.dimension {
            return Err(EmbeddingFailure::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            }
            .into());
        }
        Ok(())
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let vector = self.inner.embed(text).await?;
        self.check(&vector)?;
        Ok(vector)
    }

    /// Embeds `texts` in batches; fails as a whole if any batch fails.
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_index, batch) in texts.chunks(self.batch_size).enumerate() {
            let batch_vectors = self.inner.embed_many(batch).await?;
            if batch_vectors.len() != batch.len() {
                return Err(EmbeddingFailure::CountMismatch {
                    expected: batch.len(),
                    actual: batch_vectors.len(),
                }
                .into());
            }
            for vector in &batch_vectors {
                self.check(vector)?;
            }
            tracing::debug!(
                batch = batch_index,
                embedded = vectors.len() + batch_vectors.len(),
                total = texts.len(),
                "Embedded chunk batch"
            );
            vectors.extend(batch_vectors);
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Returns vectors of `dims[call]`, one call per `embed_many`.
    struct ScriptedProvider {
        dims: Vec<usize>,
        calls: AtomicUsize,
        drop_last: bool,
    }

    impl ScriptedProvider {
        fn new(dims: Vec<usize>) -> Self {
            Self {
                dims,
                calls: AtomicUsize::new(0),
                drop_last: false,
            }
        }

        fn next_dim(&self) -> usize {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.dims[call.min(self.dims.len() - 1)]
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
            Ok(vec![0.5; self.next_dim()])
        }

        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            let dim = self.next_dim();
            let mut out: Vec<Vec<f32>> = texts.iter().map(|_| vec![0.5; dim]).collect();
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("chunk {}", i)).collect()
    }

    #[tokio::test]
    async fn probe_records_dimension() {
        let embedder = CheckedEmbedder::probe(Arc::new(ScriptedProvider::new(vec![8])), 4)
            .await
            .unwrap();
        assert_eq!(embedder.dimension(), 8);

        let vectors = embedder.embed_many(&texts(10)).await.unwrap();
        assert_eq!(vectors.len(), 10);
        assert!(vectors.iter().all(|v| v.len() == 8));
    }

    #[tokio::test]
    async fn probe_rejects_empty_vector() {
        let err = CheckedEmbedder::probe(Arc::new(ScriptedProvider::new(vec![0])), 4)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RagError::Embedding(EmbeddingFailure::EmptyVector)));
    }

    #[tokio::test]
    async fn dimension_change_is_fatal() {
        let provider = ScriptedProvider::new(vec![8, 8, 4]);
        let embedder = CheckedEmbedder::probe(Arc::new(provider), 2).await.unwrap();

        let err = embedder.embed_many(&texts(4)).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::Embedding(EmbeddingFailure::DimensionMismatch {
                expected: 8,
                actual: 4
            })
        ));
    }

    #[tokio::test]
    async fn missing_vectors_are_detected() {
        let mut provider = ScriptedProvider::new(vec![3]);
        provider.drop_last = true;
        let embedder = CheckedEmbedder::probe(Arc::new(provider), 16).await.unwrap();

        let err = embedder.embed_many(&texts(5)).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::Embedding(EmbeddingFailure::CountMismatch {
                expected: 5,
                actual: 4
            })
        ));
    }
}
