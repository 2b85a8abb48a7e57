//! Multi-agent pipeline
//!
//! A query is routed to exactly one specialist (browser or research), whose
//! report is written into the shared context and then merged into a final
//! answer by the synthesizer.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use fusion_agent::ToolRegistry;
use fusion_config::{AgentProfile, SwarmSettings};
use fusion_provider::{Llm, Message, Tool, ToolChoice};

use crate::{Result, SwarmError};

pub const BROWSER_NAVIGATOR: &str = "browser_navigator";
pub const RESEARCHER: &str = "researcher";
pub const SYNTHESIZER: &str = "synthesizer";

/// Lower-cased substrings that send a query down the browser branch
pub const WEB_KEYWORDS: [&str; 5] = ["navigate", "website", "web page", "homepage", "browser"];

/// Key/value notes visible to every agent in one workflow run
pub type SharedContext = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Browser,
    Research,
}

pub fn classify(query: &str) -> Route {
    let query = query.to_lowercase();
    if WEB_KEYWORDS.iter().any(|keyword| query.contains(keyword)) {
        Route::Browser
    } else {
        Route::Research
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub instructions: String,
    /// Ask through the tool protocol instead of a plain completion
    pub use_tools: bool,
}

impl Task {
    pub fn browser(query: &str) -> Self {
        Self {
            id: "browser_navigation".to_string(),
            instructions: format!("Navigate and extract detailed information: {}", query),
            use_tools: true,
        }
    }

    pub fn research(query: &str) -> Self {
        Self {
            id: "general_research".to_string(),
            instructions: format!("Provide a comprehensive explanation for: {}", query),
            use_tools: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentReport {
    pub agent: String,
    pub role: String,
    pub result: String,
}

/// One role-specialised model handle
pub struct PipelineAgent {
    profile: AgentProfile,
    llm: Llm,
    tools: Vec<Tool>,
    timeout: Duration,
}

impl PipelineAgent {
    /// Derives its own gateway handle from `base`: same transport, the
    /// profile's model and the given temperature
    pub fn new(profile: AgentProfile, base: &Llm, temperature: f32) -> Self {
        let llm = base.with_model(profile.model.clone()).with_temperature(temperature);
        Self {
            profile,
            llm,
            tools: ToolRegistry::with_defaults().to_params(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn role(&self) -> &str {
        &self.profile.role
    }

    pub fn llm(&self) -> &Llm {
        &self.llm
    }

    pub fn render_prompt(&self, task: &Task, context: &SharedContext) -> String {
        format!(
            "Role: {}\nTask: {}\n\nShared Context:\n{}\n\nBe concise and direct in your response.",
            self.profile.role,
            task.instructions,
            render_context(context)
        )
    }

    /// Run `task`; failures come back inline in the report
    pub async fn process_task(&self, task: &Task, context: &SharedContext) -> AgentReport {
        debug!("{} processing task '{}'", self.name(), task.id);
        let result = match tokio::time::timeout(self.timeout, self.complete(task, context)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                error!("Agent {} task error: {}", self.name(), e);
                format!("Error: {}", e)
            }
            Err(_) => {
                let e = SwarmError::Timeout(self.timeout);
                error!("Agent {} task error: {}", self.name(), e);
                format!("Error: {}", e)
            }
        };

        AgentReport {
            agent: self.profile.name.clone(),
            role: self.profile.role.clone(),
            result,
        }
    }

    async fn complete(&self, task: &Task, context: &SharedContext) -> Result<String> {
        let messages = [Message::user(self.render_prompt(task, context))];

        if !task.use_tools {
            return Ok(self.llm.ask(&messages, None, false, None).await?);
        }

        let reply = self
            .llm
            .ask_with_tools(&messages, None, &self.tools, ToolChoice::Auto, None)
            .await?;
        Ok(reply_text(&reply))
    }
}

/// Content of a reply, or its proposed calls when it has none
fn reply_text(reply: &Message) -> String {
    match reply.content.as_deref() {
        Some(content) if !content.is_empty() => content.to_string(),
        _ => reply
            .calls()
            .iter()
            .map(|call| format!("{}({})", call.function.name, call.function.arguments))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn render_context(context: &SharedContext) -> String {
    context
        .iter()
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt asking the synthesizer to condense `source` into an answer to `query`
pub fn synthesis_prompt(query: &str, source: &str) -> String {
    format!(
        "Synthesize a clear and concise answer for the query:\n\n\
         Query: {}\n\
         Source Information: {}\n\n\
         Requirements:\n\
         - Provide a direct, informative response\n\
         - Focus on key points\n\
         - Use clear, accessible language\n\
         - Keep the answer under 250 words",
        query, source
    )
}

pub struct MultiAgentPipeline {
    agents: Vec<PipelineAgent>,
    synthesis_temperature: f32,
}

impl MultiAgentPipeline {
    pub fn new(base: &Llm, settings: &SwarmSettings) -> Self {
        let timeout = Duration::from_secs(settings.task_timeout_secs);
        let agents = settings
            .agents
            .iter()
            .cloned()
            .map(|profile| {
                PipelineAgent::new(profile, base, settings.agent_temperature).with_timeout(timeout)
            })
            .collect();

        Self {
            agents,
            synthesis_temperature: settings.synthesis_temperature,
        }
    }

    pub fn from_agents(agents: Vec<PipelineAgent>, synthesis_temperature: f32) -> Self {
        Self {
            agents,
            synthesis_temperature,
        }
    }

    pub fn agents(&self) -> &[PipelineAgent] {
        &self.agents
    }

    pub fn agent(&self, name: &str) -> Result<&PipelineAgent> {
        self.agents
            .iter()
            .find(|agent| agent.name() == name)
            .ok_or_else(|| SwarmError::MissingAgent(name.to_string()))
    }

    /// Specialist stage, then synthesis; synthesis errors are returned as-is
    pub async fn execute_workflow(&self, query: &str) -> Result<String> {
        let start = Instant::now();
        info!("◆ MULTI-AGENT WORKFLOW STARTING: {}", query);

        let (specialist, task) = match classify(query) {
            Route::Browser => (BROWSER_NAVIGATOR, Task::browser(query)),
            Route::Research => (RESEARCHER, Task::research(query)),
        };
        let agent = self.agent(specialist)?;
        debug!("Routed query to {}", specialist);

        let mut context = SharedContext::new();
        let report = agent.process_task(&task, &context).await;
        let source = report.result.clone();
        context.insert(report.agent, report.result);

        let answer = self.synthesize(query, &source).await?;

        info!(
            "◆ MULTI-AGENT WORKFLOW COMPLETED in {:.2} seconds",
            start.elapsed().as_secs_f64()
        );
        Ok(answer)
    }

    /// Condense one specialist result into the final answer
    pub async fn synthesize(&self, query: &str, source: &str) -> Result<String> {
        let synthesizer = self.agent(SYNTHESIZER)?;
        let prompt = synthesis_prompt(query, source);
        let answer = synthesizer
            .llm()
            .ask(
                &[Message::user(prompt)],
                None,
                false,
                Some(self.synthesis_temperature),
            )
            .await?;
        Ok(answer)
    }
}
