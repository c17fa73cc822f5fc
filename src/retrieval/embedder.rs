//! Text embeddings over an OpenAI-compatible `/embeddings` endpoint.

use crate::config::LlmConfig;
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Dense vector for one piece of text
pub type Embedding = Vec<f32>;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;
}

pub struct OpenAiEmbedder {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiEmbedder {
    /// Shares the model endpoint and credentials with the chat client.
    pub fn new(llm: &LlmConfig, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(llm.timeout_secs))
            .build()
            .map_err(|e| AgentError::Retrieval(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key: llm.api_key.clone(),
            base_url: llm.base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let mut request = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AgentError::Retrieval(format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::Retrieval(format!("Embedding API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AgentError::Retrieval(format!("Failed to parse embedding response: {}", e)))?;

        parse_embedding(&response_json)
    }
}

fn parse_embedding(response: &serde_json::Value) -> Result<Embedding> {
    let data = response
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| AgentError::Retrieval("No embedding data in response".to_string()))?;

    let embedding: Embedding = data
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| AgentError::Retrieval("No embedding vector in response".to_string()))?
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();

    if embedding.is_empty() {
        return Err(AgentError::Retrieval("Empty embedding vector in response".to_string()));
    }
    Ok(embedding)
}
