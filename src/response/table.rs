//! Tabular views of a result set: Markdown for people, CSV for the model.

use crate::error::{AgentError, Result};
use crate::state::Row;
use serde_json::Value;

const NULL_CELL: &str = "—";

/// Union of column names across all rows, in first-seen order.
pub fn columns(rows: &[Row]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => NULL_CELL.to_string(),
        Some(Value::String(s)) => s.replace('|', "\\|").replace('\n', " "),
        Some(other) => other.to_string(),
    }
}

/// Markdown table of at most `max_rows` rows, with a note when truncated.
pub fn render_markdown(rows: &[Row], max_rows: usize) -> String {
    let columns = columns(rows);
    if columns.is_empty() {
        return String::new();
    }

    let mut lines = Vec::with_capacity(rows.len().min(max_rows) + 3);
    lines.push(format!("| {} |", columns.join(" | ")));
    lines.push(format!("|{}|", vec!["---"; columns.len()].join("|")));

    for row in rows.iter().take(max_rows) {
        let cells: Vec<String> = columns.iter().map(|c| cell(row.get(c))).collect();
        lines.push(format!("| {} |", cells.join(" | ")));
    }

    if rows.len() > max_rows {
        lines.push(String::new());
        lines.push(format!("_Showing first {} of {} rows._", max_rows, rows.len()));
    }

    lines.join("\n")
}

/// Full result set as CSV; nulls become empty fields.
pub fn to_csv(rows: &[Row]) -> Result<String> {
    let columns = columns(rows);
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(&columns)
        .map_err(|e| AgentError::Report(format!("Failed to write CSV header: {}", e)))?;

    for row in rows {
        let record: Vec<String> = columns
            .iter()
            .map(|c| match row.get(c) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| AgentError::Report(format!("Failed to write CSV row: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AgentError::Report(format!("Failed to flush CSV: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AgentError::Report(format!("CSV is not UTF-8: {}", e)))
}
