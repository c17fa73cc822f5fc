//! Schema Resolver
//!
//! Turns the schema-lookup request into a plain-text schema description by
//! asking the model for a graph query, running it against the graph store and
//! summarizing the structured result. Any failure along that chain falls back
//! to the data-request description.

use super::graph::{ensure_read_only, GraphSchema, GraphStore};
use crate::error::{AgentError, Result};
use crate::llm::LanguageModel;
use crate::parsing;
use crate::prompts;
use crate::state::RequestState;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SchemaResolver {
    llm: Arc<dyn LanguageModel>,
    graph: Option<Arc<dyn GraphStore>>,
}

impl SchemaResolver {
    pub fn new(llm: Arc<dyn LanguageModel>, graph: Option<Arc<dyn GraphStore>>) -> Self {
        Self { llm, graph }
    }

    pub async fn resolve(&self, state: &RequestState) -> RequestState {
        let fallback = state.db_query().unwrap_or(parsing::DEFAULT_DB_QUERY);

        let Some(graph) = self.graph.as_ref() else {
            debug!("No graph store configured, using data-request description as schema");
            return state.with_schema_info(fallback);
        };

        let request = state
            .cypher_details()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(fallback);

        match self.lookup(graph.as_ref(), request).await {
            Ok(summary) => {
                info!(chars = summary.len(), "Schema resolved from graph");
                state.with_schema_info(summary)
            }
            Err(e) => {
                warn!(recovery = "SchemaResolutionFailure", error = %e, "Schema lookup failed, falling back to data request");
                state.with_schema_info(fallback)
            }
        }
    }

    async fn lookup(&self, graph: &dyn GraphStore, request: &str) -> Result<String> {
        let metadata = graph.schema_metadata().await?;
        let response = self
            .llm
            .complete(&prompts::graph_query(&metadata, request))
            .await?;

        let query = parsing::extract_graph_query(&response)
            .ok_or_else(|| AgentError::Graph("Model returned an empty graph query".to_string()))?;
        ensure_read_only(&query)?;
        debug!(query = %query, "Generated graph query");

        let rows = graph.run(&query).await?;
        let schema = GraphSchema::from_rows(&rows);
        if schema.is_empty() {
            return Err(AgentError::Graph("Graph query returned no tables".to_string()));
        }
        Ok(schema.describe())
    }
}
