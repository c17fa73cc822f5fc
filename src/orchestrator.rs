//! Orchestrator
//!
//! Sequences the pipeline nodes as a state machine:
//!
//! ```text
//! AnalyzeQuery -> ResolveSchema -> SynthesizeSql -> Execute -+-> Respond -> End
//!      ^                                                     |
//!      +------------------------ NeedsRetry -----------------+
//! ```
//!
//! Every node takes a snapshot and returns a new one. The only back-edge is
//! the retry decision after `Execute`, bounded by the gate's cap.

use crate::executor::QueryExecutor;
use crate::interpreter::QueryInterpreter;
use crate::response::{Report, ResponseSynthesizer};
use crate::retry::{GateDecision, RetryGate};
use crate::schema::SchemaResolver;
use crate::state::RequestState;
use crate::synthesizer::SqlSynthesizer;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    AnalyzeQuery,
    ResolveSchema,
    SynthesizeSql,
    Execute,
    Respond,
    End,
}

/// Snapshot emitted after a stage completes. Observability only.
#[derive(Debug, Clone)]
pub struct StageUpdate {
    pub stage: Stage,
    pub state: RequestState,
}

/// Terminal state plus any report built for it.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub state: RequestState,
    pub report: Option<Report>,
}

#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub final_response: String,
    pub report: Option<Report>,
    pub loop_count: u32,
    pub sql_query: Option<String>,
}

impl From<PipelineOutcome> for AgentResponse {
    fn from(outcome: PipelineOutcome) -> Self {
        Self {
            final_response: outcome.state.final_response().unwrap_or_default().to_string(),
            loop_count: outcome.state.loop_count(),
            sql_query: outcome.state.sql_query().map(String::from),
            report: outcome.report,
        }
    }
}

pub struct Orchestrator {
    interpreter: QueryInterpreter,
    resolver: SchemaResolver,
    synthesizer: SqlSynthesizer,
    executor: QueryExecutor,
    gate: RetryGate,
    responder: ResponseSynthesizer,
}

impl Orchestrator {
    pub fn new(
        interpreter: QueryInterpreter,
        resolver: SchemaResolver,
        synthesizer: SqlSynthesizer,
        executor: QueryExecutor,
        gate: RetryGate,
        responder: ResponseSynthesizer,
    ) -> Self {
        Self {
            interpreter,
            resolver,
            synthesizer,
            executor,
            gate,
            responder,
        }
    }

    /// Answer one question. `prior_error` is a diagnostic from an earlier
    /// failed request that the interpreter should take into account.
    pub async fn submit(&self, user_query: &str, prior_error: Option<String>) -> AgentResponse {
        self.run(RequestState::with_prior_error(user_query, prior_error), None)
            .await
            .into()
    }

    /// Like [`submit`](Self::submit), streaming a snapshot after every stage.
    pub async fn run_with_updates(
        &self,
        user_query: &str,
        prior_error: Option<String>,
        updates: UnboundedSender<StageUpdate>,
    ) -> AgentResponse {
        self.run(RequestState::with_prior_error(user_query, prior_error), Some(&updates))
            .await
            .into()
    }

    pub async fn run(
        &self,
        initial: RequestState,
        updates: Option<&UnboundedSender<StageUpdate>>,
    ) -> PipelineOutcome {
        let span = info_span!("request", request_id = %Uuid::new_v4());
        self.drive(initial, updates).instrument(span).await
    }

    async fn drive(
        &self,
        initial: RequestState,
        updates: Option<&UnboundedSender<StageUpdate>>,
    ) -> PipelineOutcome {
        info!(user_query = %initial.user_query(), "Request started");

        let mut state = initial;
        let mut report = None;
        let mut stage = Stage::AnalyzeQuery;
        let mut pass: u32 = 0;

        while stage != Stage::End {
            let next = match stage {
                Stage::AnalyzeQuery => {
                    pass += 1;
                    info!(pass, loop_count = state.loop_count(), "Pass started");
                    state = self.interpreter.interpret(&state).await;
                    Stage::ResolveSchema
                }
                Stage::ResolveSchema => {
                    state = self.resolver.resolve(&state).await;
                    Stage::SynthesizeSql
                }
                Stage::SynthesizeSql => {
                    state = self.synthesizer.synthesize(&state).await;
                    Stage::Execute
                }
                Stage::Execute => {
                    state = self.executor.execute(&state).await;
                    match self.gate.decide(&state) {
                        GateDecision::NeedsRetry => Stage::AnalyzeQuery,
                        GateDecision::Terminal => Stage::Respond,
                    }
                }
                Stage::Respond => {
                    let (responded, built) = self.responder.respond(&state).await;
                    state = responded;
                    report = built;
                    Stage::End
                }
                Stage::End => Stage::End,
            };

            if let Some(tx) = updates {
                // A dropped receiver only stops observation
                let _ = tx.send(StageUpdate {
                    stage,
                    state: state.clone(),
                });
            }
            stage = next;
        }

        info!(
            passes = pass,
            loop_count = state.loop_count(),
            succeeded = state.query_result().is_some(),
            "Request finished"
        );

        PipelineOutcome { state, report }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StatementGuard;
    use crate::response::MarkdownReportBuilder;
    use crate::retrieval::QueryExampleRetriever;
    use crate::store::RelationalStore;
    use crate::testing::{ScriptedModel, StubStore};
    use serde_json::json;
    use std::sync::Arc;

    const INTERPRETATION: &str = "Query_Details: total spend from monthly_forecast table for Finance in 2024\nAction_Details: Report the total\nCypher_Details: monthly_forecast";

    fn model(sql_answer: &str) -> Arc<ScriptedModel> {
        ScriptedModel::routed(&[
            ("USER QUERY BREAKDOWN", Some(INTERPRETATION)),
            ("You are an expert SQL assistant", Some(sql_answer)),
            ("INTELLIGENT DATA PROCESSING", Some("Processed Output: Finance spent 1250000.5 in 2024.")),
        ])
    }

    fn orchestrator(llm: Arc<ScriptedModel>, store: Arc<dyn RelationalStore>) -> Orchestrator {
        Orchestrator::new(
            QueryInterpreter::new(llm.clone()),
            SchemaResolver::new(llm.clone(), None),
            SqlSynthesizer::new(llm.clone(), store.clone(), QueryExampleRetriever::disabled()),
            QueryExecutor::new(store, StatementGuard::default()),
            RetryGate::new(5),
            ResponseSynthesizer::new(llm, 1000).with_report_builder(Arc::new(MarkdownReportBuilder::default())),
        )
    }

    #[tokio::test]
    async fn test_single_pass_success() {
        let store = StubStore::returning(vec![json!({"l1": "Finance", "total_spend": 1250000.5})]);
        let agent = orchestrator(model("```sql\nSELECT l1, SUM(spend) AS total_spend FROM f\n```"), store);

        let outcome = agent.run(RequestState::new("List total spend for Finance in 2024"), None).await;

        assert!(outcome.state.error().is_none());
        assert_eq!(outcome.state.loop_count(), 0);
        let message = outcome.state.final_response().unwrap();
        assert!(message.contains("Finance"));
        assert!(message.contains("1250000.5"));
        assert!(outcome.report.is_some());
    }

    #[tokio::test]
    async fn test_always_failing_store_stops_at_cap() {
        let llm = model("```sql\nSELECT 1\n```");
        let store = StubStore::failing("database is locked");
        let agent = orchestrator(llm.clone(), store.clone());

        let outcome = agent.run(RequestState::new("q"), None).await;

        assert_eq!(outcome.state.loop_count(), 5);
        assert_eq!(store.statements().len(), 5);
        assert_eq!(
            outcome.state.final_response(),
            Some("Could not execute query. Error: Error executing query: database is locked")
        );
        let interpretations = llm.prompts().iter().filter(|p| p.contains("USER QUERY BREAKDOWN")).count();
        assert_eq!(interpretations, 5);
        assert!(llm.prompts().iter().all(|p| !p.contains("INTELLIGENT DATA PROCESSING")));
    }

    #[tokio::test]
    async fn test_updates_follow_state_machine() {
        let store = StubStore::returning(vec![json!({"a": 1})]);
        let agent = orchestrator(model("```sql\nSELECT 1 AS a\n```"), store);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let response = agent.run_with_updates("q", None, tx).await;

        let mut stages = Vec::new();
        while let Ok(update) = rx.try_recv() {
            stages.push(update.stage);
        }
        assert_eq!(
            stages,
            vec![
                Stage::AnalyzeQuery,
                Stage::ResolveSchema,
                Stage::SynthesizeSql,
                Stage::Execute,
                Stage::Respond
            ]
        );
        assert_eq!(response.sql_query.as_deref(), Some("SELECT 1 AS a"));
        assert_eq!(response.loop_count, 0);
    }

    #[tokio::test]
    async fn test_prior_error_reaches_interpreter() {
        let llm = model("```sql\nSELECT 1 AS a\n```");
        let agent = orchestrator(llm.clone(), StubStore::returning(vec![json!({"a": 1})]));

        agent.submit("q", Some("no such column: spend_amt".to_string())).await;

        assert!(llm.prompts()[0].starts_with("PREVIOUS QUERY EXECUTION FAILED: no such column: spend_amt"));
    }
}
