//! In-process capability stubs shared by the unit tests.

use crate::error::{AgentError, Result};
use crate::llm::LanguageModel;
use crate::retrieval::{Embedder, Embedding};
use crate::schema::{GraphStore, SchemaCatalog};
use crate::state::Row;
use crate::store::RelationalStore;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Language model that answers from a script and records every prompt.
pub(crate) struct ScriptedModel {
    routes: Vec<(String, Option<String>)>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn always(text: &str) -> Arc<Self> {
        Arc::new(Self {
            routes: Vec::new(),
            fallback: Some(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            routes: Vec::new(),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Answer with the first route whose marker appears in the prompt; a
    /// `None` answer or an unmatched prompt is a model error.
    pub fn routed(routes: &[(&str, Option<&str>)]) -> Arc<Self> {
        Arc::new(Self {
            routes: routes
                .iter()
                .map(|(marker, answer)| (marker.to_string(), answer.map(String::from)))
                .collect(),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let answer = match self.routes.iter().find(|(marker, _)| prompt.contains(marker.as_str())) {
            Some((_, answer)) => answer.clone(),
            None => self.fallback.clone(),
        };
        answer.ok_or_else(|| AgentError::Llm("scripted failure".to_string()))
    }
}

pub(crate) fn rows(values: Vec<Value>) -> Vec<Row> {
    values
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}

/// Relational store returning fixed rows (or a fixed error).
pub(crate) struct StubStore {
    outcome: std::result::Result<Vec<Row>, String>,
    catalog: SchemaCatalog,
    statements: Mutex<Vec<String>>,
}

impl StubStore {
    pub fn returning(values: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(rows(values)),
            catalog: SchemaCatalog::default(),
            statements: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(message.to_string()),
            catalog: SchemaCatalog::default(),
            statements: Mutex::new(Vec::new()),
        })
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelationalStore for StubStore {
    async fn execute(&self, statement: &str) -> Result<Vec<Row>> {
        self.statements.lock().unwrap().push(statement.to_string());
        self.outcome.clone().map_err(AgentError::Store)
    }

    async fn introspect(&self) -> Result<SchemaCatalog> {
        Ok(self.catalog.clone())
    }
}

/// Graph store returning fixed rows (or failing every call).
pub(crate) struct StubGraph {
    rows: Option<Vec<Row>>,
    queries: Mutex<Vec<String>>,
}

impl StubGraph {
    pub fn returning(values: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            rows: Some(rows(values)),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            rows: None,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphStore for StubGraph {
    async fn schema_metadata(&self) -> Result<String> {
        match self.rows {
            Some(_) => Ok("Node properties:\n- Table {name: STRING}\n- Field {name: STRING, data_type: STRING}".to_string()),
            None => Err(AgentError::Graph("graph unavailable".to_string())),
        }
    }

    async fn run(&self, query: &str) -> Result<Vec<Row>> {
        self.queries.lock().unwrap().push(query.to_string());
        self.rows
            .clone()
            .ok_or_else(|| AgentError::Graph("graph unavailable".to_string()))
    }
}

/// Hashed bag-of-words embedding; texts sharing words score higher.
pub(crate) struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vector = vec![0.0f32; 64];
        for word in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % vector.len();
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }
}
