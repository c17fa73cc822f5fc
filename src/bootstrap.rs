//! Bootstrap
//!
//! Builds every capability client once from an [`AgentConfig`] and wires them
//! into an [`Orchestrator`]. The clients are shared handles, so one
//! orchestrator serves any number of concurrent requests.

use crate::config::{AgentConfig, ExamplesConfig, LlmConfig, PipelineConfig};
use crate::error::Result;
use crate::executor::{QueryExecutor, StatementGuard};
use crate::interpreter::QueryInterpreter;
use crate::llm::{LanguageModel, LlmClient};
use crate::orchestrator::Orchestrator;
use crate::response::{MarkdownReportBuilder, ResponseSynthesizer};
use crate::retrieval::{load_examples, EmbeddingIndex, OpenAiEmbedder, QueryExampleRetriever, SimilarityIndex};
use crate::retry::RetryGate;
use crate::schema::{GraphStore, Neo4jHttpStore, SchemaResolver};
use crate::store::{self, RelationalStore};
use crate::synthesizer::SqlSynthesizer;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// The external services one orchestrator talks to.
#[derive(Clone)]
pub struct Capabilities {
    pub llm: Arc<dyn LanguageModel>,
    pub store: Arc<dyn RelationalStore>,
    pub graph: Option<Arc<dyn GraphStore>>,
    pub index: Option<Arc<dyn SimilarityIndex>>,
}

impl Capabilities {
    pub async fn connect(config: &AgentConfig) -> Result<Self> {
        let llm: Arc<dyn LanguageModel> = Arc::new(LlmClient::new(&config.llm)?);
        let store = store::connect(&config.database_url).await?;

        let graph = match config.graph {
            Some(ref graph) => {
                info!(url = %graph.url, "Graph schema store configured");
                Some(Arc::new(Neo4jHttpStore::new(graph)?) as Arc<dyn GraphStore>)
            }
            None => None,
        };

        let index = match config.examples {
            Some(ref examples) => example_index(&config.llm, examples).await,
            None => None,
        };

        Ok(Self { llm, store, graph, index })
    }
}

/// Missing or unreadable examples only disable retrieval.
async fn example_index(llm: &LlmConfig, config: &ExamplesConfig) -> Option<Arc<dyn SimilarityIndex>> {
    let examples = match load_examples(Path::new(&config.path)) {
        Ok(examples) => examples,
        Err(e) => {
            warn!(error = %e, "Query examples unavailable, retrieval disabled");
            return None;
        }
    };

    let embedder = match OpenAiEmbedder::new(llm, config.embedding_model.clone()) {
        Ok(embedder) => Arc::new(embedder),
        Err(e) => {
            warn!(error = %e, "Embedder unavailable, retrieval disabled");
            return None;
        }
    };

    match EmbeddingIndex::build(embedder, examples).await {
        Ok(index) => Some(Arc::new(index) as Arc<dyn SimilarityIndex>),
        Err(e) => {
            warn!(error = %e, "Failed to index query examples, retrieval disabled");
            None
        }
    }
}

/// Wire an orchestrator around already-built capabilities.
pub async fn assemble(pipeline: &PipelineConfig, capabilities: Capabilities) -> Orchestrator {
    let Capabilities { llm, store, graph, index } = capabilities;

    let mut interpreter = QueryInterpreter::new(llm.clone());
    match store.introspect().await {
        Ok(catalog) if !catalog.is_empty() => {
            info!(tables = catalog.tables.len(), "Loaded schema catalog");
            interpreter = interpreter.with_schema_reference(catalog.reference());
        }
        Ok(_) => warn!("Relational store has no tables"),
        Err(e) => warn!(error = %e, "Catalog introspection failed"),
    }

    let mut responder = ResponseSynthesizer::new(llm.clone(), pipeline.table_max_rows);
    if pipeline.generate_report {
        responder = responder.with_report_builder(Arc::new(MarkdownReportBuilder::new(
            pipeline.report_rows_per_page,
        )));
    }

    Orchestrator::new(
        interpreter,
        SchemaResolver::new(llm.clone(), graph),
        SqlSynthesizer::new(
            llm,
            store.clone(),
            QueryExampleRetriever::new(index, pipeline.example_count),
        ),
        QueryExecutor::new(store, StatementGuard::new(pipeline.read_only_guard)),
        RetryGate::new(pipeline.loop_cap),
        responder,
    )
}

/// Connect everything named in `config` and build the orchestrator.
pub async fn build(config: &AgentConfig) -> Result<Orchestrator> {
    let capabilities = Capabilities::connect(config).await?;
    Ok(assemble(&config.pipeline, capabilities).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;

    #[tokio::test]
    async fn test_missing_examples_disable_retrieval() {
        let examples = ExamplesConfig {
            path: "/nonexistent/FAQ.json".to_string(),
            ..ExamplesConfig::default()
        };
        assert!(example_index(&LlmConfig::default(), &examples).await.is_none());
    }

    #[tokio::test]
    async fn test_unsupported_database_url() {
        let config = AgentConfig {
            database_url: "oracle://db".to_string(),
            ..AgentConfig::default()
        };
        let err = build(&config).await.err().unwrap();
        assert!(matches!(err, AgentError::Config(_)));
    }
}
