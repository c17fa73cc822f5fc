//! Similarity Index
//!
//! In-memory nearest-neighbour search over historical question/statement
//! pairs. Both sides of every pair are embedded, so a new question can match
//! either an old question or the statement that answered it.

use super::embedder::{Embedder, Embedding};
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// A historical question and the SQL that answered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExample {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub example: QueryExample,
    pub score: f32,
}

#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Up to `k` nearest examples, best first.
    async fn search(&self, text: &str, k: usize) -> Result<Vec<SearchHit>>;
}

/// Read a JSON array of `{question, answer}` objects.
pub fn load_examples(path: &Path) -> Result<Vec<QueryExample>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AgentError::Retrieval(format!("Failed to read examples {}: {}", path.display(), e))
    })?;
    let examples: Vec<QueryExample> = serde_json::from_str(&content)?;
    Ok(examples)
}

pub struct EmbeddingIndex {
    embedder: Arc<dyn Embedder>,
    examples: Vec<QueryExample>,
    /// (example index, embedding) for every indexed text
    vectors: Vec<(usize, Embedding)>,
}

impl EmbeddingIndex {
    pub async fn build(embedder: Arc<dyn Embedder>, examples: Vec<QueryExample>) -> Result<Self> {
        let mut vectors = Vec::with_capacity(examples.len() * 2);
        for (idx, example) in examples.iter().enumerate() {
            for text in [&example.question, &example.answer] {
                if text.trim().is_empty() {
                    continue;
                }
                vectors.push((idx, embedder.embed(text).await?));
            }
        }

        info!(examples = examples.len(), vectors = vectors.len(), "Built example index");
        Ok(Self {
            embedder,
            examples,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

#[async_trait]
impl SimilarityIndex for EmbeddingIndex {
    async fn search(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        if self.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embedder.embed(text).await?;

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .map(|(idx, embedding)| (*idx, cosine_similarity(&query, embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut seen = Vec::new();
        let mut hits = Vec::new();
        for (idx, score) in scored {
            if seen.contains(&idx) {
                continue;
            }
            seen.push(idx);
            hits.push(SearchHit {
                example: self.examples[idx].clone(),
                score,
            });
            if hits.len() == k {
                break;
            }
        }
        Ok(hits)
    }
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
