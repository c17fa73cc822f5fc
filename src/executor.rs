//! Query Executor
//!
//! Runs the candidate statement and classifies the outcome. A missing
//! statement, a rejected statement, a store failure and an empty row set are
//! all execution errors; each one counts one failed pass. There is no retry
//! here.

use crate::error::{AgentError, Result};
use crate::parsing::mask_quoted;
use crate::state::RequestState;
use crate::store::RelationalStore;
use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;
use tracing::{info, warn};

pub const EMPTY_RESULT_MESSAGE: &str = "No such data exists in the database";
pub const MISSING_STATEMENT_MESSAGE: &str = "no SQL statement was generated";

lazy_static! {
    static ref MUTATING_KEYWORD: Regex = Regex::new(
        r"(?i)\b(insert|update|delete|merge|upsert|drop|create|alter|truncate|grant|revoke|attach|detach|pragma|vacuum|copy|call|exec|execute)\b"
    )
    .unwrap();
}

/// Allows only a single read-only query statement.
#[derive(Debug, Clone, Copy)]
pub struct StatementGuard {
    enabled: bool,
}

impl StatementGuard {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn check(&self, sql: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let dialect = GenericDialect {};
        match Parser::parse_sql(&dialect, sql) {
            Ok(statements) => match statements.as_slice() {
                [Statement::Query(_)] => Ok(()),
                [] => Err(AgentError::UnsafeStatement("empty statement".to_string())),
                [_] => Err(AgentError::UnsafeStatement(
                    "only read-only SELECT queries are allowed".to_string(),
                )),
                _ => Err(AgentError::UnsafeStatement(
                    "multiple statements are not allowed".to_string(),
                )),
            },
            // Dialect gaps: fall back to keyword checks
            Err(_) => Self::check_heuristic(sql),
        }
    }

    fn check_heuristic(sql: &str) -> Result<()> {
        let masked = mask_quoted(sql);
        let trimmed = masked.trim().trim_end_matches(';').trim();
        let upper = trimmed.to_uppercase();

        if !(upper.starts_with("SELECT") || upper.starts_with("WITH")) {
            return Err(AgentError::UnsafeStatement(
                "only read-only SELECT queries are allowed".to_string(),
            ));
        }
        if trimmed.contains(';') {
            return Err(AgentError::UnsafeStatement(
                "multiple statements are not allowed".to_string(),
            ));
        }
        if let Some(m) = MUTATING_KEYWORD.find(trimmed) {
            return Err(AgentError::UnsafeStatement(format!(
                "statement contains '{}'",
                m.as_str()
            )));
        }
        Ok(())
    }
}

impl Default for StatementGuard {
    fn default() -> Self {
        Self::new(true)
    }
}

pub struct QueryExecutor {
    store: Arc<dyn RelationalStore>,
    guard: StatementGuard,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn RelationalStore>, guard: StatementGuard) -> Self {
        Self { store, guard }
    }

    pub async fn execute(&self, state: &RequestState) -> RequestState {
        let Some(sql) = state.sql_query() else {
            return Self::failed(state, MISSING_STATEMENT_MESSAGE);
        };

        if let Err(e) = self.guard.check(sql) {
            return Self::failed(state, &e.to_string());
        }

        match self.store.execute(sql).await {
            Ok(rows) if rows.is_empty() => Self::failed(state, EMPTY_RESULT_MESSAGE),
            Ok(rows) => {
                info!(rows = rows.len(), "Query executed");
                state.with_query_result(rows)
            }
            Err(e) => {
                let cause = match e {
                    AgentError::Store(message) => message,
                    other => other.to_string(),
                };
                Self::failed(state, &cause)
            }
        }
    }

    fn failed(state: &RequestState, cause: &str) -> RequestState {
        let next = state.with_execution_error(format!("Error executing query: {}", cause));
        warn!(recovery = "ExecutionError", loop_count = next.loop_count(), cause = %cause, "Query execution failed");
        next
    }
}
