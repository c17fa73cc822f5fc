//! Query Example Retriever
//!
//! Formats the nearest historical question/statement pairs as context for SQL
//! synthesis. Read-only, and silent on failure: an unavailable index simply
//! contributes no examples.

use super::index::SimilarityIndex;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct QueryExampleRetriever {
    index: Option<Arc<dyn SimilarityIndex>>,
    k: usize,
}

impl QueryExampleRetriever {
    pub fn new(index: Option<Arc<dyn SimilarityIndex>>, k: usize) -> Self {
        Self { index, k }
    }

    pub fn disabled() -> Self {
        Self::new(None, 0)
    }

    pub async fn retrieve(&self, user_query: &str) -> String {
        let Some(index) = self.index.as_ref() else {
            return String::new();
        };

        match index.search(user_query, self.k).await {
            Ok(hits) => {
                debug!(hits = hits.len(), "Retrieved similar examples");
                hits.iter()
                    .map(|hit| format!(" User Query: {}\n   → SQL: {}", hit.example.question, hit.example.answer))
                    .collect::<Vec<_>>()
                    .join("\n\n")
            }
            Err(e) => {
                warn!(error = %e, "Example retrieval failed, continuing without examples");
                String::new()
            }
        }
    }
}
