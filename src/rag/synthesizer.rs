//! Answer synthesis from retrieved context.

use std::sync::Arc;

use super::index::ScoredChunk;
use crate::core::config::PromptConfig;
use crate::core::errors::RagError;
use crate::llm::{GenerationProvider, Prompt};

const CONTEXT_SEPARATOR: &str = "\n\n";

pub struct Synthesizer {
    provider: Arc<dyn GenerationProvider>,
    prompt: PromptConfig,
}

impl Synthesizer {
    pub fn new(provider: Arc<dyn GenerationProvider>, prompt: PromptConfig) -> Self {
        Self { provider, prompt }
    }

    /// Joins chunk texts in retrieval order, separated by a blank line.
    pub fn build_context(chunks: &[ScoredChunk]) -> String {
        chunks
            .iter()
            .map(|scored| scored.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    }

    pub fn render_prompt(&self, question: &str, context: &str) -> Prompt {
        Prompt {
            system: self.prompt.system_instruction.clone(),
            user: format!(
                "Context information is below:\n\
                 ---------------------\n\
                 {context}\n\
                 ---------------------\n\n\
                 Given the context information and not prior knowledge, answer the question: {question}"
            ),
        }
    }

    /// Returns the provider's raw output, or the fixed no-context answer
    /// without calling the provider when nothing was retrieved.
    pub async fn synthesize(&self, question: &str, chunks: &[ScoredChunk]) -> Result<String, RagError> {
        if chunks.is_empty() {
            return Ok(self.prompt.no_context_answer.clone());
        }

        let context = Self::build_context(chunks);
        let prompt = self.render_prompt(question, &context);

        tracing::debug!(
            provider = self.provider.name(),
            context_chars = context.len(),
            "Generating answer"
        );

        self.provider.generate(&prompt).await
    }
}
