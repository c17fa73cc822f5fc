//! SQL Synthesizer
//!
//! Builds the synthesis instruction from the data request, the resolved
//! schema, similar historical queries and the store's own catalog, then pulls
//! the statement out of the model's ```sql block. No block means
//! `sql_query = None`, which the executor treats as a failed pass.

use crate::llm::LanguageModel;
use crate::parsing;
use crate::prompts::{self, SqlPromptInput};
use crate::retrieval::QueryExampleRetriever;
use crate::schema::SchemaCatalog;
use crate::state::RequestState;
use crate::store::RelationalStore;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SqlSynthesizer {
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn RelationalStore>,
    retriever: QueryExampleRetriever,
}

impl SqlSynthesizer {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        store: Arc<dyn RelationalStore>,
        retriever: QueryExampleRetriever,
    ) -> Self {
        Self { llm, store, retriever }
    }

    pub async fn synthesize(&self, state: &RequestState) -> RequestState {
        let catalog = match self.store.introspect().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "Catalog introspection failed, continuing without it");
                SchemaCatalog::default()
            }
        };
        let examples = self.retriever.retrieve(state.user_query()).await;

        let db_query = state.db_query().unwrap_or(parsing::DEFAULT_DB_QUERY);
        let table_names = catalog.table_names();
        let formatted_schema = catalog.formatted_schema();
        let formatted_relations = catalog.formatted_relations();

        let prompt = prompts::sql_generation(&SqlPromptInput {
            user_query: state.user_query(),
            db_query,
            schema_info: state.schema_info().unwrap_or(db_query),
            examples: &examples,
            table_names: &table_names,
            formatted_schema: &formatted_schema,
            formatted_relations: &formatted_relations,
        });

        let sql = match self.llm.complete(&prompt).await {
            Ok(response) => parsing::extract_sql(&response),
            Err(e) => {
                warn!(error = %e, "SQL synthesis call failed");
                None
            }
        };

        match sql {
            Some(ref sql) => debug!(sql = %sql, "Synthesized SQL"),
            None => warn!(recovery = "SqlExtractionFailure", "No SQL block in model output"),
        }

        state.with_sql_query(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::testing::{ScriptedModel, StubStore};

    #[tokio::test]
    async fn test_extracts_fenced_sql() {
        let llm = ScriptedModel::always("Here it is:\n```sql\nSELECT 1\n```");
        let synthesizer = SqlSynthesizer::new(llm, StubStore::returning(vec![]), QueryExampleRetriever::disabled());

        let next = synthesizer.synthesize(&RequestState::new("q")).await;
        assert_eq!(next.sql_query(), Some("SELECT 1"));
    }

    #[tokio::test]
    async fn test_missing_block_is_none() {
        let llm = ScriptedModel::always("SELECT 1");
        let synthesizer = SqlSynthesizer::new(llm, StubStore::returning(vec![]), QueryExampleRetriever::disabled());

        let next = synthesizer
            .synthesize(&RequestState::new("q").with_sql_query(Some("SELECT stale".to_string())))
            .await;
        assert_eq!(next.sql_query(), None);
    }

    #[tokio::test]
    async fn test_prompt_carries_catalog_and_schema() {
        let store = SqliteStore::in_memory(
            "CREATE TABLE hierarchy (id INTEGER PRIMARY KEY, l1 TEXT);
             CREATE TABLE monthly_forecast (hierarchy_id INTEGER REFERENCES hierarchy(id), spend REAL);",
        )
        .unwrap();
        let llm = ScriptedModel::always("```sql\nSELECT 1\n```");
        let synthesizer = SqlSynthesizer::new(llm.clone(), Arc::new(store), QueryExampleRetriever::disabled());

        let state = RequestState::new("total spend").with_schema_info("The 'monthly_forecast' table contains fields like: spend (REAL).");
        synthesizer.synthesize(&state).await;

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("hierarchy, monthly_forecast"));
        assert!(prompt.contains("`id` (INTEGER) [Primary Key]"));
        assert!(prompt.contains("column `hierarchy_id` refers to `hierarchy.id`"));
        assert!(prompt.contains("fields like: spend (REAL)"));
        assert!(prompt.contains("User question: total spend"));
    }
}
