//! Schema Catalog
//!
//! The relational store's own description of its tables, columns and foreign
//! keys, rendered into the text blocks used by the interpretation and SQL
//! synthesis instructions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub primary_key: bool,
    pub not_null: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
    pub on_update: String,
    pub on_delete: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub tables: Vec<TableSchema>,
}

impl SchemaCatalog {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> String {
        self.tables
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// One line per table: "Table `t` contains: `col` (TYPE) [Primary Key], ..."
    pub fn formatted_schema(&self) -> String {
        if self.tables.is_empty() {
            return String::new();
        }

        let lines: Vec<String> = self
            .tables
            .iter()
            .map(|table| {
                let columns: Vec<String> = table.columns.iter().map(describe_column).collect();
                format!("Table `{}` contains: {}", table.name, columns.join(", "))
            })
            .collect();

        format!("Table Schemas:\n{}", lines.join("\n"))
    }

    pub fn formatted_relations(&self) -> String {
        if self.tables.is_empty() {
            return String::new();
        }

        let lines: Vec<String> = self
            .tables
            .iter()
            .map(|table| {
                if table.foreign_keys.is_empty() {
                    return format!("Table `{}` has no foreign key relationships.", table.name);
                }
                let refs: Vec<String> = table
                    .foreign_keys
                    .iter()
                    .map(|fk| {
                        format!(
                            "column `{}` refers to `{}.{}` [ON DELETE: {}, ON UPDATE: {}]",
                            fk.column, fk.references_table, fk.references_column, fk.on_delete, fk.on_update
                        )
                    })
                    .collect();
                format!("In table `{}`, {}", table.name, refs.join(", "))
            })
            .collect();

        format!("Table Relationships:\n{}", lines.join("\n"))
    }

    /// Compact "table(col, col) -> referenced tables" listing for interpretation.
    pub fn reference(&self) -> String {
        self.tables
            .iter()
            .map(|table| {
                let columns: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
                let mut line = format!("{}({})", table.name, columns.join(", "));
                if !table.foreign_keys.is_empty() {
                    let mut referenced: Vec<&str> =
                        table.foreign_keys.iter().map(|fk| fk.references_table.as_str()).collect();
                    referenced.dedup();
                    line.push_str(&format!(" references {}", referenced.join(", ")));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn describe_column(column: &ColumnInfo) -> String {
    let mut text = format!("`{}` ({})", column.name, column.data_type);
    if column.primary_key {
        text.push_str(" [Primary Key]");
    }
    if column.not_null {
        text.push_str(" [NOT NULL]");
    }
    if let Some(ref default) = column.default {
        text.push_str(&format!(" [Default: {}]", default));
    }
    text
}
