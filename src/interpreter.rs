//! Query Interpreter
//!
//! Projects the raw question (plus the last diagnostic, if any) into a
//! data-request description, a post-processing intent and a schema-lookup
//! request. Never fails: an unreachable model or malformed output degrades to
//! the fixed defaults in `crate::parsing`.

use crate::llm::LanguageModel;
use crate::parsing;
use crate::prompts;
use crate::state::RequestState;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct QueryInterpreter {
    llm: Arc<dyn LanguageModel>,
    schema_reference: Option<String>,
}

impl QueryInterpreter {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            schema_reference: None,
        }
    }

    /// Compact schema description embedded in every interpretation prompt.
    pub fn with_schema_reference(mut self, reference: impl Into<String>) -> Self {
        self.schema_reference = Some(reference.into());
        self
    }

    pub async fn interpret(&self, state: &RequestState) -> RequestState {
        let prompt = prompts::analyze_query(
            state.user_query(),
            state.error(),
            self.schema_reference.as_deref(),
        );

        let response = match self.llm.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(recovery = "InterpretationDefault", error = %e, "Interpretation call failed, using defaults");
                String::new()
            }
        };

        let interpretation = parsing::parse_interpretation(response.trim());
        if interpretation.db_query == parsing::DEFAULT_DB_QUERY {
            warn!(recovery = "InterpretationDefault", "No Query_Details section in model output");
        }
        debug!(
            db_query = %interpretation.db_query,
            general_query = %interpretation.general_query,
            cypher_details = %interpretation.cypher_details,
            "Query interpreted"
        );

        state.interpreted(interpretation)
    }
}
