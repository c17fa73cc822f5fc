use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nlsql_agent::bootstrap;
use nlsql_agent::config::AgentConfig;
use nlsql_agent::store;
use nlsql_agent::{AgentResponse, Orchestrator};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nlsql-agent")]
#[command(about = "Answer analytics questions in natural language over a SQL database")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CommonArgs {
    /// JSON config file (environment variables and flags override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database URL, e.g. sqlite://my_database.db or postgres://user@host/db
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Chat model name
    #[arg(long, global = true)]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a single question
    Ask {
        question: String,

        /// Error text from an earlier failed attempt
        #[arg(long)]
        prior_error: Option<String>,

        /// Write the report artifact to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Print every pipeline stage as it completes
        #[arg(long)]
        show_stages: bool,
    },
    /// Interactive question loop on stdin
    Chat,
    /// Print the database catalog as the agent sees it
    Schema,
}

fn load_config(common: &CommonArgs) -> Result<AgentConfig> {
    let base = match common.config {
        Some(ref path) => AgentConfig::from_file(path)?,
        None => AgentConfig::default(),
    };
    let mut config = base.with_env(|key| std::env::var(key).ok())?;

    if let Some(ref url) = common.database_url {
        config.database_url = url.clone();
    }
    if let Some(ref model) = common.model {
        config.llm.model = model.clone();
    }
    Ok(config)
}

fn print_response(response: &AgentResponse) {
    println!("\n{}", response.final_response);
    if let Some(ref sql) = response.sql_query {
        println!("\nSQL: {}", sql);
    }
    println!("Failed passes: {}", response.loop_count);
}

async fn ask(
    agent: &Orchestrator,
    question: &str,
    prior_error: Option<String>,
    report_path: Option<PathBuf>,
    show_stages: bool,
) -> Result<()> {
    let response = if show_stages {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<nlsql_agent::StageUpdate>();
        let printer = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                let state = update.state;
                println!(
                    "[{:?}] loop_count={} sql={} error={}",
                    update.stage,
                    state.loop_count(),
                    state.sql_query().unwrap_or("-"),
                    state.error().unwrap_or("-")
                );
            }
        });
        let response = agent.run_with_updates(question, prior_error, tx).await;
        printer.await.context("stage printer failed")?;
        response
    } else {
        agent.submit(question, prior_error).await
    };

    print_response(&response);

    if let (Some(path), Some(report)) = (report_path, response.report.as_ref()) {
        std::fs::write(&path, &report.bytes)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("Report ({} pages) written to {}", report.pages, path.display());
    }
    Ok(())
}

/// The last failed chat question and the error it ended with.
#[derive(Default)]
struct LastFailure {
    question: Option<String>,
    error: Option<String>,
}

impl LastFailure {
    /// Question to run and the prior error to carry. The error is carried
    /// only when the input is `retry` or repeats the failed question.
    fn resolve(&mut self, input: &str) -> Option<(String, Option<String>)> {
        let question = self.question.take();
        let error = self.error.take();

        if input.eq_ignore_ascii_case("retry") {
            return question.map(|q| (q, error));
        }
        match question {
            Some(q) if q.eq_ignore_ascii_case(input) => Some((input.to_string(), error)),
            _ => Some((input.to_string(), None)),
        }
    }

    fn record(&mut self, question: &str, response: &AgentResponse) {
        if response.final_response.starts_with("Could not execute query") {
            self.question = Some(question.to_string());
            self.error = Some(response.final_response.clone());
        }
    }
}

async fn chat(agent: &Orchestrator) -> Result<()> {
    let stdin = std::io::stdin();
    let mut last_failure = LastFailure::default();

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        let Some((question, prior_error)) = last_failure.resolve(input) else {
            println!("Nothing to retry.");
            continue;
        };
        let response = agent.submit(&question, prior_error).await;
        last_failure.record(&question, &response);
        print_response(&response);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.common)?;
    info!(database = %config.database_url, model = %config.llm.model, "Configuration loaded");

    match cli.command {
        Command::Ask {
            question,
            prior_error,
            report,
            show_stages,
        } => {
            let agent = bootstrap::build(&config).await?;
            ask(&agent, &question, prior_error, report, show_stages).await?;
        }
        Command::Chat => {
            let agent = bootstrap::build(&config).await?;
            chat(&agent).await?;
        }
        Command::Schema => {
            let store = store::connect(&config.database_url).await?;
            let catalog = store.introspect().await?;
            println!("{}\n\n{}", catalog.formatted_schema(), catalog.formatted_relations());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_on(question: &str) -> LastFailure {
        LastFailure {
            question: Some(question.to_string()),
            error: Some("Could not execute query. Error: no such table: spend".to_string()),
        }
    }

    #[test]
    fn test_unrelated_question_gets_no_prior_error() {
        let mut last = failed_on("total spend for Finance");
        let (question, prior_error) = last.resolve("list all departments").unwrap();
        assert_eq!(question, "list all departments");
        assert!(prior_error.is_none());
        assert!(last.resolve("retry").is_none());
    }

    #[test]
    fn test_repeat_or_retry_carries_prior_error() {
        let mut last = failed_on("total spend for Finance");
        let (_, prior_error) = last.resolve("Total spend for finance").unwrap();
        assert!(prior_error.unwrap().contains("no such table"));

        let mut last = failed_on("total spend for Finance");
        let (question, prior_error) = last.resolve("retry").unwrap();
        assert_eq!(question, "total spend for Finance");
        assert!(prior_error.is_some());
    }

    #[test]
    fn test_retry_without_failure() {
        assert!(LastFailure::default().resolve("retry").is_none());
    }
}
