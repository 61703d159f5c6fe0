use std::sync::Arc;

use super::index::{ScoredChunk, SqliteIndex};
use crate::core::errors::RagError;
use crate::llm::CheckedEmbedder;

const MAX_K: usize = 1000;

/// The `(k, score_threshold)` pair of one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub k: usize,
    pub score_threshold: f32,
}

impl RetrievalParams {
    pub fn new(k: usize, score_threshold: f32) -> Result<Self, RagError> {
        if k == 0 || k > MAX_K {
            return Err(RagError::InvalidQuery(format!(
                "k must be between 1 and {}, got {}",
                MAX_K, k
            )));
        }
        if !score_threshold.is_finite() || !(0.0..=1.0).contains(&score_threshold) {
            return Err(RagError::InvalidQuery(format!(
                "score_threshold must be between 0 and 1, got {}",
                score_threshold
            )));
        }
        Ok(Self { k, score_threshold })
    }
}

/// Binds one query's parameters to an index snapshot.
///
/// Built fresh for every `ask`; never stored on the engine.
pub struct Retriever<'a> {
    index: Arc<SqliteIndex>,
    embedder: &'a CheckedEmbedder,
    params: RetrievalParams,
}

impl<'a> Retriever<'a> {
    pub fn new(index: Arc<SqliteIndex>, embedder: &'a CheckedEmbedder, params: RetrievalParams) -> Self {
        Self {
            index,
            embedder,
            params,
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>, RagError> {
        let vector = self.embedder.embed(query).await?;
        let results = self
            .index
            .query(&vector, self.params.k, self.params.score_threshold)
            .await?;

        if results.is_empty() {
            tracing::warn!(
                threshold = self.params.score_threshold,
                "No chunks retrieved above threshold"
            );
        } else {
            for (rank, scored) in results.iter().enumerate() {
                tracing::debug!(rank, score = scored.score, page = scored.chunk.page, "Retrieved chunk");
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_validated() {
        assert!(RetrievalParams::new(5, 0.2).is_ok());
        assert!(RetrievalParams::new(1, 0.0).is_ok());
        assert!(RetrievalParams::new(1000, 1.0).is_ok());

        for (k, threshold) in [(0, 0.2), (1001, 0.2), (5, -0.1), (5, 1.5), (5, f32::NAN)] {
            let err = RetrievalParams::new(k, threshold).unwrap_err();
            assert_eq!(err.kind(), "invalid_query");
        }
    }
}
