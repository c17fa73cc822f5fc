//! Report artifacts
//!
//! A report combines the narrative with the result table, split into pages.
//! Building is purely in memory; writing the bytes anywhere is up to the
//! caller.

use super::table;
use crate::error::{AgentError, Result};
use crate::state::Row;
use chrono::Utc;

pub struct ReportRequest<'a> {
    pub user_query: &'a str,
    pub narrative: Option<&'a str>,
    pub sql_query: Option<&'a str>,
    pub rows: &'a [Row],
}

#[derive(Debug, Clone)]
pub struct Report {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
    pub pages: usize,
}

pub trait ReportBuilder: Send + Sync {
    fn build(&self, request: &ReportRequest<'_>) -> Result<Report>;
}

/// Paginated Markdown document.
pub struct MarkdownReportBuilder {
    rows_per_page: usize,
}

impl MarkdownReportBuilder {
    pub fn new(rows_per_page: usize) -> Self {
        Self { rows_per_page }
    }
}

impl Default for MarkdownReportBuilder {
    fn default() -> Self {
        Self::new(40)
    }
}

impl ReportBuilder for MarkdownReportBuilder {
    fn build(&self, request: &ReportRequest<'_>) -> Result<Report> {
        if self.rows_per_page == 0 {
            return Err(AgentError::Report("rows per page must be positive".to_string()));
        }

        let now = Utc::now();
        let mut doc = String::new();
        doc.push_str("# Query Report\n\n");
        doc.push_str(&format!("**Question:** {}\n\n", request.user_query));
        doc.push_str(&format!("**Generated:** {}\n\n", now.format("%Y-%m-%d %H:%M:%S UTC")));

        if let Some(narrative) = request.narrative.filter(|n| !n.trim().is_empty()) {
            doc.push_str("## Analysis\n\n");
            doc.push_str(narrative.trim());
            doc.push_str("\n\n");
        }

        if let Some(sql) = request.sql_query {
            doc.push_str("## SQL\n\n```sql\n");
            doc.push_str(sql);
            doc.push_str("\n```\n\n");
        }

        doc.push_str("## Data\n\n");
        let chunks: Vec<&[Row]> = request.rows.chunks(self.rows_per_page).collect();
        let pages = chunks.len().max(1);

        if chunks.is_empty() {
            doc.push_str("### Page 1 of 1\n\n_No rows._\n");
        }
        for (idx, chunk) in chunks.iter().enumerate() {
            doc.push_str(&format!("### Page {} of {}\n\n", idx + 1, pages));
            doc.push_str(&table::render_markdown(chunk, self.rows_per_page));
            doc.push_str("\n\n");
        }

        Ok(Report {
            file_name: format!("query_report_{}.md", now.format("%Y%m%d_%H%M%S")),
            mime: "text/markdown".to_string(),
            bytes: doc.into_bytes(),
            pages,
        })
    }
}
