//! Graph-schema capability
//!
//! The schema graph stores `Table` and `Field` nodes. The pipeline only needs
//! two things from it: a description of its own shape (for writing graph
//! queries) and a way to run a read-only query.

use crate::config::GraphConfig;
use crate::error::{AgentError, Result};
use crate::parsing::mask_quoted;
use crate::state::Row;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Labels, properties and relationship types, as text for prompting.
    async fn schema_metadata(&self) -> Result<String>;

    /// Run a read-only graph query; each row maps column name to value.
    async fn run(&self, query: &str) -> Result<Vec<Row>>;
}

lazy_static! {
    static ref WRITE_CLAUSE: Regex =
        Regex::new(r"(?i)\b(create|merge|delete|detach|set|remove|drop|load\s+csv)\b").unwrap();
}

/// Reject graph queries that could modify the graph. Quoted text such as
/// regex patterns is not scanned.
pub fn ensure_read_only(query: &str) -> Result<()> {
    match WRITE_CLAUSE.find(&mask_quoted(query)) {
        Some(m) => Err(AgentError::Graph(format!(
            "Graph query contains a write clause '{}'",
            m.as_str()
        ))),
        None => Ok(()),
    }
}

/// A table as returned by the schema graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableNode {
    #[serde(alias = "name", alias = "table")]
    pub table_name: String,
    #[serde(default)]
    pub fields: Vec<FieldNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldNode {
    Detailed {
        name: String,
        #[serde(default, alias = "type", alias = "dataType")]
        data_type: Option<String>,
    },
    Name(String),
}

impl FieldNode {
    fn describe(&self) -> String {
        match self {
            FieldNode::Detailed {
                name,
                data_type: Some(data_type),
            } => format!("{} ({})", name, data_type),
            FieldNode::Detailed { name, data_type: None } => name.clone(),
            FieldNode::Name(name) => name.clone(),
        }
    }
}

/// Structured schema resolved from the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSchema {
    pub primary_tables: Vec<TableNode>,
    pub related_tables: Vec<TableNode>,
}

impl GraphSchema {
    /// Collect tables from raw graph rows.
    ///
    /// Accepts `{primary_tables, related_tables}` objects anywhere in the
    /// result as well as bare `{table_name, fields}` objects, which count as
    /// primary tables. Duplicate table names are kept once.
    pub fn from_rows(rows: &[Row]) -> Self {
        let mut schema = GraphSchema::default();
        for row in rows {
            for value in row.values() {
                schema.collect(value, false);
            }
        }
        schema
    }

    fn collect(&mut self, value: &Value, related: bool) {
        match value {
            Value::Array(items) => {
                for item in items {
                    self.collect(item, related);
                }
            }
            Value::Object(map) => {
                if map.contains_key("primary_tables") || map.contains_key("related_tables") {
                    if let Some(primary) = map.get("primary_tables") {
                        self.collect(primary, false);
                    }
                    if let Some(others) = map.get("related_tables") {
                        self.collect(others, true);
                    }
                    return;
                }
                match serde_json::from_value::<TableNode>(value.clone()) {
                    Ok(table) => self.push(table, related),
                    Err(_) => {
                        for nested in map.values() {
                            self.collect(nested, related);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn push(&mut self, table: TableNode, related: bool) {
        let exists = self
            .primary_tables
            .iter()
            .chain(self.related_tables.iter())
            .any(|t| t.table_name == table.table_name);
        if exists {
            return;
        }
        if related {
            self.related_tables.push(table);
        } else {
            self.primary_tables.push(table);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primary_tables.is_empty() && self.related_tables.is_empty()
    }

    /// Plain-text summary suitable as SQL synthesis context.
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        for table in self.primary_tables.iter().chain(self.related_tables.iter()) {
            let fields: Vec<String> = table.fields.iter().map(FieldNode::describe).collect();
            if fields.is_empty() {
                lines.push(format!("The '{}' table has no recorded fields.", table.table_name));
            } else {
                lines.push(format!(
                    "The '{}' table contains fields like: {}.",
                    table.table_name,
                    fields.join(", ")
                ));
            }
        }
        for related in &self.related_tables {
            for primary in &self.primary_tables {
                lines.push(format!(
                    "The '{}' table is linked to '{}' via a schema relationship.",
                    primary.table_name, related.table_name
                ));
            }
        }
        lines.join("\n")
    }
}

/// Neo4j over its transactional HTTP endpoint.
pub struct Neo4jHttpStore {
    http: reqwest::Client,
    endpoint: String,
    user: String,
    password: String,
}

impl Neo4jHttpStore {
    pub fn new(config: &GraphConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::Graph(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/db/{}/tx/commit",
                config.url.trim_end_matches('/'),
                config.database
            ),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    async fn post(&self, statement: &str) -> Result<Vec<Row>> {
        let body = serde_json::json!({
            "statements": [{"statement": statement}]
        });

        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Graph(format!("Graph API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::Graph(format!("Graph API error ({}): {}", status, error_text)));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Graph(format!("Failed to parse graph response: {}", e)))?;

        rows_from_payload(&payload)
    }
}

#[async_trait]
impl GraphStore for Neo4jHttpStore {
    async fn schema_metadata(&self) -> Result<String> {
        let nodes = self
            .post("CALL db.schema.nodeTypeProperties() YIELD nodeLabels, propertyName, propertyTypes RETURN nodeLabels, propertyName, propertyTypes")
            .await?;
        let relationships = self
            .post("MATCH (a)-[r]->(b) RETURN DISTINCT labels(a) AS from, type(r) AS rel, labels(b) AS to LIMIT 100")
            .await?;

        let mut lines = vec!["Node properties:".to_string()];
        for row in &nodes {
            lines.push(format!(
                "- {} {{{}: {}}}",
                value_text(row.get("nodeLabels")),
                value_text(row.get("propertyName")),
                value_text(row.get("propertyTypes"))
            ));
        }
        lines.push("Relationships:".to_string());
        for row in &relationships {
            lines.push(format!(
                "- ({})-[:{}]->({})",
                value_text(row.get("from")),
                value_text(row.get("rel")),
                value_text(row.get("to"))
            ));
        }
        Ok(lines.join("\n"))
    }

    async fn run(&self, query: &str) -> Result<Vec<Row>> {
        ensure_read_only(query)?;
        debug!(query = %query, "Running graph query");
        self.post(query).await
    }
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| value_text(Some(v)))
            .collect::<Vec<_>>()
            .join(":"),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Rows from a `tx/commit` response body.
fn rows_from_payload(payload: &Value) -> Result<Vec<Row>> {
    if let Some(errors) = payload.get("errors").and_then(|e| e.as_array()) {
        if let Some(first) = errors.first() {
            let message = first
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown graph error");
            return Err(AgentError::Graph(message.to_string()));
        }
    }

    let mut rows = Vec::new();
    let results = payload
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| AgentError::Graph("No results in graph response".to_string()))?;

    for result in results {
        let columns: Vec<String> = result
            .get("columns")
            .and_then(|c| c.as_array())
            .map(|cols| cols.iter().filter_map(|c| c.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let data = result.get("data").and_then(|d| d.as_array()).cloned().unwrap_or_default();
        for entry in data {
            let values = entry.get("row").and_then(|r| r.as_array()).cloned().unwrap_or_default();
            let row: Row = columns.iter().cloned().zip(values).collect();
            rows.push(row);
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_read_only_guard() {
        assert!(ensure_read_only("MATCH (t:Table) RETURN t").is_ok());
        assert!(ensure_read_only("MATCH (t:Table) WHERE t.name =~ '(?i).*offset.*' RETURN t").is_ok());
        assert!(ensure_read_only("MATCH (t) DETACH DELETE t").is_err());
        assert!(ensure_read_only("create (t:Table {name: 'x'})").is_err());
    }

    #[test]
    fn test_write_words_inside_literals_are_allowed() {
        for word in ["drop", "set", "remove", "create"] {
            let query = format!("MATCH (t:Table) WHERE toLower(t.name) =~ '(?i).*{}.*' RETURN t", word);
            assert!(ensure_read_only(&query).is_ok(), "{}", query);
        }
        assert!(ensure_read_only("MATCH (t:Table {name: \"delete_log\"}) RETURN t").is_ok());
        assert!(ensure_read_only("MATCH (t:Table {name: 'x'}) SET t.name = 'drop'").is_err());
    }

    #[test]
    fn test_schema_from_structured_result() {
        let rows = vec![row(json!({
            "result": {
                "primary_tables": [{
                    "table_name": "monthly_forecast",
                    "fields": [{"name": "spend", "data_type": "REAL"}, {"name": "fiscal_year", "type": "INTEGER"}]
                }],
                "related_tables": [{"name": "hierarchy", "fields": ["id", "l1"]}]
            }
        }))];

        let schema = GraphSchema::from_rows(&rows);
        assert_eq!(schema.primary_tables.len(), 1);
        assert_eq!(schema.related_tables.len(), 1);

        let text = schema.describe();
        assert!(text.contains("The 'monthly_forecast' table contains fields like: spend (REAL), fiscal_year (INTEGER)."));
        assert!(text.contains("The 'hierarchy' table contains fields like: id, l1."));
        assert!(text.contains("The 'monthly_forecast' table is linked to 'hierarchy' via a schema relationship."));
    }

    #[test]
    fn test_schema_from_flat_table_list() {
        let rows = vec![
            row(json!({"t": {"table_name": "account", "fields": []}})),
            row(json!({"t": {"table_name": "account", "fields": []}})),
            row(json!({"count": 3})),
        ];
        let schema = GraphSchema::from_rows(&rows);
        assert_eq!(schema.primary_tables.len(), 1);
        assert!(schema.related_tables.is_empty());
        assert!(GraphSchema::from_rows(&[row(json!({"count": 3}))]).is_empty());
    }

    #[test]
    fn test_rows_from_payload() {
        let payload = json!({
            "results": [{"columns": ["name", "fields"], "data": [{"row": ["hierarchy", ["id"]], "meta": []}]}],
            "errors": []
        });
        let rows = rows_from_payload(&payload).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("hierarchy"));

        let failed = json!({"results": [], "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "Invalid input"}]});
        assert!(rows_from_payload(&failed).is_err());
    }
}
