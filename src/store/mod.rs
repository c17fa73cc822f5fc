//! Relational store capability
//!
//! Executes candidate statements and describes its own catalog. Implementations
//! must be safe to share across concurrent requests.

pub mod postgres;
pub mod sqlite;

use crate::error::{AgentError, Result};
use crate::schema::SchemaCatalog;
use crate::state::Row;
use async_trait::async_trait;
use std::sync::Arc;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Run one statement; rows keep the column order of the result set.
    async fn execute(&self, statement: &str) -> Result<Vec<Row>>;

    async fn introspect(&self) -> Result<SchemaCatalog>;
}

/// Open a store from a connection URL, choosing the backend by scheme.
pub async fn connect(url: &str) -> Result<Arc<dyn RelationalStore>> {
    let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
    match scheme.as_str() {
        "sqlite" => Ok(Arc::new(SqliteStore::open(sqlite_path(url))?)),
        "postgres" | "postgresql" => Ok(Arc::new(PostgresStore::connect(url).await?)),
        _ => Err(AgentError::Config(format!(
            "Unsupported database URL '{}': expected sqlite: or postgres:",
            url
        ))),
    }
}

/// `sqlite://file.db`, `sqlite:///abs/file.db` and `sqlite:file.db` all name a file.
fn sqlite_path(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_path() {
        assert_eq!(sqlite_path("sqlite://my_database.db"), "my_database.db");
        assert_eq!(sqlite_path("sqlite:///var/data/spend.db"), "/var/data/spend.db");
        assert_eq!(sqlite_path("sqlite:spend.db"), "spend.db");
    }

    #[tokio::test]
    async fn test_unknown_scheme_is_config_error() {
        let err = connect("mysql://localhost/spend").await.err().unwrap();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[tokio::test]
    async fn test_connect_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spend.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (a INTEGER); INSERT INTO t VALUES (7);")
            .unwrap();

        let store = connect(&format!("sqlite://{}", path.display())).await.unwrap();
        let rows = store.execute("SELECT a FROM t").await.unwrap();
        assert_eq!(rows[0]["a"], serde_json::json!(7));
    }
}
