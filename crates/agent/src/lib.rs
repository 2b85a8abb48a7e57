//! AGENT: Think/act tool-calling agent
//!
//! Drives a text-only completion endpoint through the in-band tool protocol,
//! executes the calls it proposes and always hands back a final answer.

use std::fmt;
use thiserror::Error;

pub mod executor;
pub mod loop_agent;
pub mod memory;
pub mod prompt;
pub mod summary;
pub mod tools;

pub use executor::{ToolExecutor, ToolOutcome};
pub use loop_agent::AgentLoop;
pub use memory::Memory;
pub use summary::{extract_final_answer, Summary, SummaryChain, SummarySource, SummaryStrategy};
pub use tools::{ToolRegistry, ToolTrait};

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Tool calls required but none provided")]
    ToolCallRequired,

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    #[error("TOOL FAILED: {0}")]
    ToolExecution(String),

    #[error("INVALID STATE: cannot run from {0}")]
    InvalidState(AgentState),

    #[error("COMPLETION ERROR: {0}")]
    Provider(#[from] fusion_provider::ProviderError),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Lifecycle of one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentState {
    #[default]
    Idle,
    Running,
    Finished,
    Error,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Finished | AgentState::Error)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AgentState::Idle => "IDLE",
            AgentState::Running => "RUNNING",
            AgentState::Finished => "FINISHED",
            AgentState::Error => "ERROR",
        };
        f.write_str(label)
    }
}
