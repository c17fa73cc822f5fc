//! Request State
//!
//! The single value threaded through every pipeline node. Nodes never mutate a
//! snapshot in place: each transition below clones the snapshot, updates the
//! fields it owns and hands back the new value.

use serde::{Deserialize, Serialize};

/// One result row: column name to value, in the order the store returned them.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Parsed output of the interpretation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpretation {
    /// Data-request description (what to fetch)
    pub db_query: String,
    /// Post-processing intent (what to do with the data)
    pub general_query: String,
    /// Schema-lookup request for the graph capability
    pub cypher_details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestState {
    user_query: String,
    general_query: Option<String>,
    db_query: Option<String>,
    cypher_details: Option<String>,
    schema_info: Option<String>,
    sql_query: Option<String>,
    query_result: Option<Vec<Row>>,
    error: Option<String>,
    final_response: Option<String>,
    loop_count: u32,
}

impl RequestState {
    /// Entry snapshot: only the user question is set.
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            ..Self::default()
        }
    }

    /// Entry snapshot seeded with a diagnostic from an earlier, failed request.
    pub fn with_prior_error(user_query: impl Into<String>, prior_error: Option<String>) -> Self {
        Self {
            error: prior_error.filter(|e| !e.trim().is_empty()),
            ..Self::new(user_query)
        }
    }

    pub fn user_query(&self) -> &str {
        &self.user_query
    }

    pub fn general_query(&self) -> Option<&str> {
        self.general_query.as_deref()
    }

    pub fn db_query(&self) -> Option<&str> {
        self.db_query.as_deref()
    }

    pub fn cypher_details(&self) -> Option<&str> {
        self.cypher_details.as_deref()
    }

    pub fn schema_info(&self) -> Option<&str> {
        self.schema_info.as_deref()
    }

    pub fn sql_query(&self) -> Option<&str> {
        self.sql_query.as_deref()
    }

    pub fn query_result(&self) -> Option<&[Row]> {
        self.query_result.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn final_response(&self) -> Option<&str> {
        self.final_response.as_deref()
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    /// Start of a pass: interpretation replaces the three descriptions and
    /// clears the previous candidate statement and diagnostic.
    pub fn interpreted(&self, interpretation: Interpretation) -> Self {
        Self {
            db_query: Some(interpretation.db_query),
            general_query: Some(interpretation.general_query),
            cypher_details: Some(interpretation.cypher_details),
            schema_info: None,
            sql_query: None,
            query_result: None,
            error: None,
            ..self.clone()
        }
    }

    pub fn with_schema_info(&self, schema_info: impl Into<String>) -> Self {
        Self {
            schema_info: Some(schema_info.into()),
            ..self.clone()
        }
    }

    /// `None` is the explicit "no statement could be extracted" signal.
    pub fn with_sql_query(&self, sql_query: Option<String>) -> Self {
        Self {
            sql_query,
            ..self.clone()
        }
    }

    /// Successful execution. Clears any diagnostic.
    pub fn with_query_result(&self, rows: Vec<Row>) -> Self {
        Self {
            query_result: Some(rows),
            error: None,
            ..self.clone()
        }
    }

    /// Failed execution. Clears any result and counts the failed pass.
    pub fn with_execution_error(&self, error: impl Into<String>) -> Self {
        Self {
            query_result: None,
            error: Some(error.into()),
            loop_count: self.loop_count + 1,
            ..self.clone()
        }
    }

    /// Terminal message. Only the response step calls this, once per request.
    pub fn with_final_response(&self, message: impl Into<String>) -> Self {
        debug_assert!(
            self.final_response.is_none(),
            "final_response must be set exactly once"
        );
        Self {
            final_response: Some(message.into()),
            ..self.clone()
        }
    }
}
