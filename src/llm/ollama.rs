use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::provider::{EmbeddingProvider, GenerationProvider};
use super::types::Prompt;
use crate::core::config::ProviderConfig;
use crate::core::errors::{EmbeddingFailure, RagError};

/// Ollama HTTP client serving both embeddings and chat generation.
#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    embedding_model: String,
    generation_model: String,
    client: Client,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
            client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingFailure::CountMismatch {
                expected: 1,
                actual: vectors.len(),
            }
            .into());
        }
        Ok(vectors.remove(0))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = json!({
            "model": self.embedding_model,
            "input": texts,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::embedding_unavailable)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::embedding_unavailable(format!(
                "Ollama embed error ({}): {}",
                status, text
            )));
        }

        let payload: EmbedResponse = res.json().await.map_err(RagError::embedding_unavailable)?;
        Ok(payload.embeddings)
    }
}

#[async_trait]
impl GenerationProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, RagError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = json!({
            "model": self.generation_model,
            "messages": prompt.messages(),
            "stream": false,
        });

        let res = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                RagError::Synthesis("generation provider timed out".to_string())
            } else {
                RagError::synthesis(e)
            }
        })?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Synthesis(format!(
                "Ollama chat error ({}): {}",
                status, text
            )));
        }

        let payload: ChatResponse = res.json().await.map_err(RagError::synthesis)?;
        Ok(payload.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = ProviderConfig {
            base_url: "http://ollama-server:11434/".to_string(),
            ..ProviderConfig::default()
        };
        let provider = OllamaProvider::new(&config).unwrap();
        assert_eq!(provider.base_url(), "http://ollama-server:11434");
    }

    #[test]
    fn chat_response_content_is_taken_verbatim() {
        let raw = r#"{"model":"m","message":{"role":"assistant","content":"  Yes.\n"},"done":true}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.message.content, "  Yes.\n");
    }

    #[tokio::test]
    async fn unreachable_provider_is_an_embedding_error() {
        let config = ProviderConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: Some(2),
            ..ProviderConfig::default()
        };
        let provider = OllamaProvider::new(&config).unwrap();
        let err = provider.embed("test query").await.unwrap_err();
        assert_eq!(err.kind(), "embedding_error");
    }

    #[tokio::test]
    #[ignore]
    async fn live_ollama_round_trip() {
        let provider = OllamaProvider::new(&ProviderConfig::default()).unwrap();
        let vector = provider.embed("hello").await.unwrap();
        assert!(!vector.is_empty());

        let prompt = Prompt {
            system: "Reply with one word.".to_string(),
            user: "Say hello".to_string(),
        };
        let answer = provider.generate(&prompt).await.unwrap();
        assert!(!answer.is_empty());
    }
}
