//! SQLite store over `rusqlite`.
//!
//! The connection is blocking, so every call runs on tokio's blocking pool
//! behind a mutex.

use super::RelationalStore;
use crate::error::{AgentError, Result};
use crate::schema::{ColumnInfo, ForeignKey, SchemaCatalog, TableSchema};
use crate::state::Row;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open an existing database file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(|e| AgentError::Store(format!("Failed to open {}: {}", path.display(), e)))?;

        info!(path = %path.display(), "Opened SQLite database (read-only)");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Writable in-memory database seeded with `seed_sql`.
    pub fn in_memory(seed_sql: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(seed_sql)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| AgentError::Store("SQLite connection lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| AgentError::Store(format!("SQLite task failed: {}", e)))?
    }
}

#[async_trait]
impl RelationalStore for SqliteStore {
    async fn execute(&self, statement: &str) -> Result<Vec<Row>> {
        let statement = statement.to_string();
        self.with_conn(move |conn| query_rows(conn, &statement)).await
    }

    async fn introspect(&self) -> Result<SchemaCatalog> {
        self.with_conn(read_catalog).await
    }
}

fn query_rows(conn: &Connection, statement: &str) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(statement)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            record.insert(name.clone(), to_json(row.get_ref(idx)?));
        }
        out.push(record);
    }
    Ok(out)
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

fn read_catalog(conn: &Connection) -> Result<SchemaCatalog> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<_, _>>()?;

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let quoted = name.replace('"', "\"\"");

        let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", quoted))?;
        let columns: Vec<ColumnInfo> = stmt
            .query_map([], |row| {
                let pk: i64 = row.get(5)?;
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    data_type: row.get(2)?,
                    not_null: row.get::<_, i64>(3)? != 0,
                    default: row.get(4)?,
                    primary_key: pk > 0,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;

        let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list(\"{}\")", quoted))?;
        let foreign_keys: Vec<ForeignKey> = stmt
            .query_map([], |row| {
                Ok(ForeignKey {
                    references_table: row.get(2)?,
                    column: row.get(3)?,
                    references_column: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    on_update: row.get(5)?,
                    on_delete: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;

        tables.push(TableSchema {
            name,
            columns,
            foreign_keys,
        });
    }

    Ok(SchemaCatalog::new(tables))
}
