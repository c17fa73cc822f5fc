//! PostgreSQL store over a `sqlx` pool.

use super::RelationalStore;
use crate::error::Result;
use crate::schema::{ColumnInfo, ForeignKey, SchemaCatalog, TableSchema};
use crate::state::Row;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Executor, Row as SqlxRow, TypeInfo};
use std::time::Duration;
use tracing::{debug, info};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Pooled connections, each with read-only transactions by default.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET default_transaction_read_only = on").await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;

        // Test the connection
        sqlx::query("SELECT 1").execute(&pool).await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelationalStore for PostgresStore {
    async fn execute(&self, statement: &str) -> Result<Vec<Row>> {
        let rows = sqlx::query(statement).fetch_all(&self.pool).await?;
        debug!(rows = rows.len(), "PostgreSQL statement returned");
        rows.iter().map(to_row).collect()
    }

    async fn introspect(&self) -> Result<SchemaCatalog> {
        let columns: Vec<(String, String, String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT c.table_name::text, c.column_name::text, c.data_type::text,
                   c.is_nullable::text, c.column_default::text
            FROM information_schema.columns c
            JOIN information_schema.tables t
              ON t.table_schema = c.table_schema AND t.table_name = c.table_name
            WHERE c.table_schema = 'public' AND t.table_type = 'BASE TABLE'
            ORDER BY c.table_name, c.ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let primary_keys: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT tc.table_name::text, kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
            WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = 'public'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let foreign_keys: Vec<(String, String, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT tc.table_name::text, kcu.column_name::text,
                   ccu.table_name::text, ccu.column_name::text,
                   rc.update_rule::text, rc.delete_rule::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
              ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema
            JOIN information_schema.referential_constraints rc
              ON rc.constraint_name = tc.constraint_name AND rc.constraint_schema = tc.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = 'public'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(assemble_catalog(columns, primary_keys, foreign_keys))
    }
}

fn assemble_catalog(
    columns: Vec<(String, String, String, String, Option<String>)>,
    primary_keys: Vec<(String, String)>,
    foreign_keys: Vec<(String, String, String, String, String, String)>,
) -> SchemaCatalog {
    let mut tables: Vec<TableSchema> = Vec::new();

    for (table, column, data_type, is_nullable, default) in columns {
        let primary_key = primary_keys.iter().any(|(t, c)| *t == table && *c == column);
        let info = ColumnInfo {
            name: column,
            data_type: data_type.to_uppercase(),
            primary_key,
            not_null: is_nullable.eq_ignore_ascii_case("NO"),
            default,
        };
        match tables.iter_mut().find(|t| t.name == table) {
            Some(existing) => existing.columns.push(info),
            None => tables.push(TableSchema {
                name: table,
                columns: vec![info],
                foreign_keys: Vec::new(),
            }),
        }
    }

    for (table, column, references_table, references_column, on_update, on_delete) in foreign_keys {
        if let Some(existing) = tables.iter_mut().find(|t| t.name == table) {
            existing.foreign_keys.push(ForeignKey {
                column,
                references_table,
                references_column,
                on_update,
                on_delete,
            });
        }
    }

    SchemaCatalog::new(tables)
}

fn to_row(row: &PgRow) -> Result<Row> {
    let mut record = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode(row, idx, column.type_info().name())?;
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

/// Decimals become floats; dates and timestamps become ISO-8601 strings.
fn decode(row: &PgRow, idx: usize, type_name: &str) -> Result<Value> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::from),
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::from),
        "FLOAT4" => row.try_get::<Option<f32>, _>(idx)?.map(|f| float(f as f64)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(float),
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(idx)?
            .map(|d| d.to_f64().map(float).unwrap_or(Value::Null)),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)?
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)?
            .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)?
            .map(|d| Value::String(d.to_rfc3339())),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(idx)?
            .map(|u| Value::String(u.to_string())),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx)?,
        _ => match row.try_get::<Option<String>, _>(idx) {
            Ok(text) => text.map(Value::String),
            Err(_) => Some(Value::String(format!("<{}>", type_name.to_lowercase()))),
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

fn float(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
