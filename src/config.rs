//! Agent configuration
//!
//! Defaults, then an optional JSON file, then environment variables. The CLI
//! applies its own flags on top.

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "http://localhost:11434/v1".to_string(),
            model: "gemma3:12b".to_string(),
            temperature: 0.1,
            max_tokens: 2000,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7474".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExamplesConfig {
    /// JSON array of `{question, answer}` pairs
    pub path: String,
    pub embedding_model: String,
}

impl Default for ExamplesConfig {
    fn default() -> Self {
        Self {
            path: "FAQ.json".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum failed executions before the request is answered with the error
    pub loop_cap: u32,
    /// Number of historical examples handed to SQL synthesis
    pub example_count: usize,
    pub table_max_rows: usize,
    pub read_only_guard: bool,
    pub generate_report: bool,
    pub report_rows_per_page: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            loop_cap: 5,
            example_count: 10,
            table_max_rows: 1000,
            read_only_guard: true,
            generate_report: true,
            report_rows_per_page: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub llm: LlmConfig,
    pub database_url: String,
    pub graph: Option<GraphConfig>,
    pub examples: Option<ExamplesConfig>,
    pub pipeline: PipelineConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            database_url: "sqlite://my_database.db".to_string(),
            graph: None,
            examples: None,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load a JSON config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: AgentConfig = serde_json::from_str(&content)?;
        config.validated()
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from an environment lookup.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = get("LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = get("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(secs) = get("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_var("LLM_TIMEOUT_SECS", &secs)?;
        }
        if let Some(url) = get("DATABASE_URL") {
            self.database_url = url;
        }

        if let Some(url) = get("NEO4J_URL") {
            let mut graph = self.graph.take().unwrap_or_default();
            graph.url = url;
            self.graph = Some(graph);
        }
        if let Some(graph) = self.graph.as_mut() {
            if let Some(user) = get("NEO4J_USER") {
                graph.user = user;
            }
            if let Some(password) = get("NEO4J_PASSWORD") {
                graph.password = password;
            }
            if let Some(database) = get("NEO4J_DATABASE") {
                graph.database = database;
            }
        }

        if let Some(path) = get("EXAMPLES_PATH") {
            let mut examples = self.examples.take().unwrap_or_default();
            examples.path = path;
            self.examples = Some(examples);
        }
        if let (Some(examples), Some(model)) = (self.examples.as_mut(), get("EMBEDDING_MODEL")) {
            examples.embedding_model = model;
        }

        if let Some(cap) = get("LOOP_CAP") {
            self.pipeline.loop_cap = parse_var("LOOP_CAP", &cap)?;
        }
        if let Some(count) = get("EXAMPLE_COUNT") {
            self.pipeline.example_count = parse_var("EXAMPLE_COUNT", &count)?;
        }
        if let Some(rows) = get("TABLE_MAX_ROWS") {
            self.pipeline.table_max_rows = parse_var("TABLE_MAX_ROWS", &rows)?;
        }
        if let Some(guard) = get("READ_ONLY_GUARD") {
            self.pipeline.read_only_guard = parse_var("READ_ONLY_GUARD", &guard)?;
        }

        self.validated()
    }

    /// Reject values the pipeline cannot honour.
    pub fn validated(self) -> Result<Self> {
        // The first pass always runs, so a cap of 0 could never hold
        if self.pipeline.loop_cap < 1 {
            return Err(AgentError::Config(format!(
                "loop_cap must be at least 1, got {}",
                self.pipeline.loop_cap
            )));
        }
        Ok(self)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| AgentError::Config(format!("Invalid value for {}: '{}' ({})", key, value, e)))
}
