//! SWARM: Role-specialised multi-agent pipeline
//!
//! Routes a query to one specialist agent, synthesises the answer with a
//! second one and falls back to a direct completion when the pipeline fails.

use std::time::Duration;
use thiserror::Error;

pub mod cache;
pub mod coordinator;
pub mod pipeline;

pub use cache::BoundedCache;
pub use coordinator::SwarmCoordinator;
pub use pipeline::{AgentReport, MultiAgentPipeline, PipelineAgent, SharedContext, Task};

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("COMPLETION ERROR: {0}")]
    Provider(#[from] fusion_provider::ProviderError),

    #[error("TASK TIMED OUT after {0:?}")]
    Timeout(Duration),

    #[error("NO AGENT NAMED '{0}' IN THE SWARM")]
    MissingAgent(String),
}

pub type Result<T> = std::result::Result<T, SwarmError>;
