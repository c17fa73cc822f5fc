pub mod bootstrap;
pub mod config;
pub mod error;
pub mod executor;
pub mod interpreter;
pub mod llm;
pub mod orchestrator;
pub mod parsing;
pub mod prompts;
pub mod response;
pub mod retrieval;
pub mod retry;
pub mod schema;
pub mod state;
pub mod store;
pub mod synthesizer;

#[cfg(test)]
pub(crate) mod testing;

pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use orchestrator::{AgentResponse, Orchestrator, Stage, StageUpdate};
pub use state::{RequestState, Row};
