//! Response Synthesizer
//!
//! Builds the one terminal message of a request. Failure and empty branches
//! are fixed texts with no model call; the success branch narrates the result
//! and may attach a report.

pub mod report;
pub mod table;

use crate::llm::LanguageModel;
use crate::parsing;
use crate::prompts;
use crate::state::RequestState;
use std::sync::Arc;
use tracing::{info, warn};

pub use report::{MarkdownReportBuilder, Report, ReportBuilder, ReportRequest};

pub const SUCCESS_HEADER: &str = "Query executed successfully";
pub const NO_RESULTS_MESSAGE: &str = "No results found in the database.";
const NO_PROCESSING: &str = "No additional processing required.";

pub struct ResponseSynthesizer {
    llm: Arc<dyn LanguageModel>,
    report_builder: Option<Arc<dyn ReportBuilder>>,
    table_max_rows: usize,
}

impl ResponseSynthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>, table_max_rows: usize) -> Self {
        Self {
            llm,
            report_builder: None,
            table_max_rows,
        }
    }

    pub fn with_report_builder(mut self, builder: Arc<dyn ReportBuilder>) -> Self {
        self.report_builder = Some(builder);
        self
    }

    pub async fn respond(&self, state: &RequestState) -> (RequestState, Option<Report>) {
        if let Some(error) = state.error() {
            return (
                state.with_final_response(format!("Could not execute query. Error: {}", error)),
                None,
            );
        }

        let rows = match state.query_result() {
            Some(rows) if !rows.is_empty() => rows,
            _ => return (state.with_final_response(NO_RESULTS_MESSAGE), None),
        };

        let rendered = table::render_markdown(rows, self.table_max_rows);
        let narrative = self.narrate(state).await;

        let message = match narrative {
            Some(ref text) => format!("{}\n\n{}\n\n{}", SUCCESS_HEADER, text, rendered),
            None => format!("{}\n\n{}", SUCCESS_HEADER, rendered),
        };

        let report = self.report_builder.as_ref().and_then(|builder| {
            let request = ReportRequest {
                user_query: state.user_query(),
                narrative: narrative.as_deref(),
                sql_query: state.sql_query(),
                rows,
            };
            match builder.build(&request) {
                Ok(report) => {
                    info!(pages = report.pages, file = %report.file_name, "Report built");
                    Some(report)
                }
                Err(e) => {
                    warn!(error = %e, "Report generation failed");
                    None
                }
            }
        });

        (state.with_final_response(message), report)
    }

    async fn narrate(&self, state: &RequestState) -> Option<String> {
        let rows = state.query_result()?;

        let data_csv = match table::to_csv(rows) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to serialize result set for narration");
                return None;
            }
        };

        let intent = match state.general_query() {
            Some(intent) if !is_no_processing(intent) && !intent.trim().is_empty() => intent,
            _ => state.user_query(),
        };

        let prompt = prompts::narration(
            state.user_query(),
            intent,
            state.sql_query().unwrap_or_default(),
            &data_csv,
        );

        match self.llm.complete(&prompt).await {
            Ok(text) => Some(parsing::strip_processed_output(&text)).filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Narration failed, answering with the table only");
                None
            }
        }
    }
}

/// Matches the no-op intent regardless of case or a trailing period.
fn is_no_processing(intent: &str) -> bool {
    let phrase = NO_PROCESSING.trim_end_matches('.');
    intent.trim().trim_end_matches('.').trim_end().eq_ignore_ascii_case(phrase)
}
