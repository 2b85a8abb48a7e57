//! Agent loop - think/act state machine

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use fusion_config::AgentSettings;
use fusion_provider::{Llm, Message, ToolCall, ToolChoice};

use crate::executor::ToolExecutor;
use crate::memory::Memory;
use crate::prompt;
use crate::summary::{Summary, SummaryChain, SummaryRequest, SummarySource};
use crate::tools::ToolRegistry;
use crate::{AgentError, AgentState, Result};

const NO_ACTION: &str = "Thinking complete - no action needed";
const NO_CONTENT: &str = "No content or commands to execute";

/// One agent: owns its memory and drives think/act steps until it finishes
pub struct AgentLoop {
    name: String,
    llm: Arc<Llm>,
    executor: ToolExecutor,
    summaries: SummaryChain,
    memory: Memory,
    state: AgentState,
    tool_choice: ToolChoice,
    max_steps: usize,
    current_step: usize,
    system_prompt: String,
    next_step_prompt: Option<String>,
    pending_calls: Vec<ToolCall>,
    question: String,
    final_summary: Option<Summary>,
}

impl AgentLoop {
    /// `fallback_llm` answers when the agent's own gateway is unusable
    pub fn new(llm: Arc<Llm>, fallback_llm: Arc<Llm>, tools: ToolRegistry) -> Self {
        let name = "fusion".to_string();
        let system_prompt = prompt::system_prompt(&name, &tools.names());

        Self {
            summaries: SummaryChain::new(llm.clone(), fallback_llm),
            name,
            llm,
            executor: ToolExecutor::new(tools),
            memory: Memory::new(),
            state: AgentState::Idle,
            tool_choice: ToolChoice::Auto,
            max_steps: 30,
            current_step: 0,
            system_prompt,
            next_step_prompt: Some(prompt::NEXT_STEP_PROMPT.to_string()),
            pending_calls: Vec::new(),
            question: String::new(),
            final_summary: None,
        }
    }

    /// Apply configured settings; an unknown tool choice is a validation error
    pub fn with_settings(mut self, settings: &AgentSettings) -> Result<Self> {
        self.tool_choice = settings.tool_choice.parse()?;
        self.max_steps = settings.max_steps;
        self.executor = self
            .executor
            .with_special_tools(settings.special_tools.clone())
            .with_max_observe(settings.max_observe);

        if settings.name != self.name {
            self.name = settings.name.clone();
            self.system_prompt = prompt::system_prompt(&self.name, &self.executor.tools().names());
        }
        if let Some(system_prompt) = &settings.system_prompt {
            self.system_prompt = system_prompt.clone();
        }
        if let Some(next_step_prompt) = &settings.next_step_prompt {
            self.next_step_prompt = Some(next_step_prompt.clone());
        }
        Ok(self)
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_observe(mut self, max_observe: Option<usize>) -> Self {
        self.executor = self.executor.with_max_observe(max_observe);
        self
    }

    pub fn with_special_tools(mut self, names: Vec<String>) -> Self {
        self.executor = self.executor.with_special_tools(names);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// `None` disables the per-step user prompt
    pub fn with_next_step_prompt(mut self, next_step_prompt: Option<String>) -> Self {
        self.next_step_prompt = next_step_prompt;
        self
    }

    pub fn with_summaries(mut self, summaries: SummaryChain) -> Self {
        self.summaries = summaries;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn tool_choice(&self) -> ToolChoice {
        self.tool_choice
    }

    pub fn final_summary(&self) -> Option<&Summary> {
        self.final_summary.as_ref()
    }

    /// Back to IDLE with empty memory
    pub fn reset(&mut self) {
        self.memory.clear();
        self.state = AgentState::Idle;
        self.current_step = 0;
        self.pending_calls.clear();
        self.question.clear();
        self.final_summary = None;
    }

    /// Answer `question`; always returns user-facing text
    pub async fn run(&mut self, question: &str) -> String {
        match self.run_loop(question).await {
            Ok(()) => {
                if self.final_summary.is_none() {
                    let request = self.summary_request(None);
                    let summary = self.summaries.summarize(&request).await;
                    self.store_summary(summary);
                }
            }
            Err(e) => {
                error!("Error in run: {}", e);
                let request = SummaryRequest {
                    question,
                    status: None,
                };
                let summary = self.summaries.recover(&request).await;
                self.final_summary = Some(summary);
            }
        }

        self.final_summary
            .as_ref()
            .map(|s| s.text.clone())
            .unwrap_or_default()
    }

    async fn run_loop(&mut self, question: &str) -> Result<()> {
        if self.state != AgentState::Idle {
            return Err(AgentError::InvalidState(self.state));
        }

        self.question = question.to_string();
        self.final_summary = None;
        self.memory.push(Message::user(question));
        self.transition(AgentState::Running);

        while self.current_step < self.max_steps && self.state != AgentState::Finished {
            self.current_step += 1;
            match self.step().await {
                Ok(result) => info!("Step {}: {}", self.current_step, result),
                Err(e) => {
                    self.transition(AgentState::Error);
                    return Err(e);
                }
            }
        }

        if self.state != AgentState::Finished {
            info!("Terminated: Reached max step ({})", self.max_steps);
            self.transition(AgentState::Finished);
        }
        Ok(())
    }

    /// One think/act cycle
    pub async fn step(&mut self) -> Result<String> {
        if !self.think().await {
            return Ok(NO_ACTION.to_string());
        }
        self.act().await
    }

    /// Ask the model for the next move; `true` means act on it
    pub async fn think(&mut self) -> bool {
        if let Some(next_step) = &self.next_step_prompt {
            self.memory.push(Message::user(next_step.clone()));
        }

        let system = [Message::system(self.system_prompt.clone())];
        let tools = self.executor.tools().to_params();
        let response = match self
            .llm
            .ask_with_tools(
                self.memory.messages(),
                Some(&system),
                &tools,
                self.tool_choice,
                None,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Completion failed during think: {}", e);
                let request = self.summary_request(None);
                let summary = self.summaries.recover(&request).await;
                self.final_summary = Some(summary);
                self.transition(AgentState::Finished);
                return false;
            }
        };

        let calls = response.calls().to_vec();
        let has_content = response.content.as_deref().is_some_and(|c| !c.is_empty());
        info!(
            "◆ {} THOUGHTS: {}",
            self.name,
            response.content.as_deref().unwrap_or_default()
        );
        info!("◆ {} SELECTED {} TOOLS", self.name, calls.len());
        if !calls.is_empty() {
            let names: Vec<&str> = calls.iter().map(|c| c.function.name.as_str()).collect();
            debug!("Tools being prepared: {:?}", names);
        }

        if self.tool_choice == ToolChoice::None {
            if !calls.is_empty() {
                warn!("{} tried to use tools when they weren't available", self.name);
            }
            self.pending_calls.clear();
            if let Some(content) = response.content.filter(|c| !c.is_empty()) {
                self.memory.push(Message::assistant(content));
                return true;
            }
            return false;
        }

        if response.content.is_some() || !calls.is_empty() {
            self.memory.push(response);
        }
        self.pending_calls = calls;

        match self.tool_choice {
            ToolChoice::Required if self.pending_calls.is_empty() => true,
            ToolChoice::Auto if self.pending_calls.is_empty() => has_content,
            _ => !self.pending_calls.is_empty(),
        }
    }

    /// Execute pending calls in order
    pub async fn act(&mut self) -> Result<String> {
        if self.pending_calls.is_empty() {
            if self.tool_choice == ToolChoice::Required {
                return Err(AgentError::ToolCallRequired);
            }
            return Ok(self
                .memory
                .last()
                .and_then(|m| m.content.clone())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| NO_CONTENT.to_string()));
        }

        let calls = std::mem::take(&mut self.pending_calls);
        let mut results = Vec::with_capacity(calls.len());

        for call in &calls {
            let observation = self.execute_tool(call).await;
            let observation = self.executor.truncate(observation);
            info!(
                "◆ TOOL '{}' COMPLETED: {}",
                call.function.name, observation
            );

            self.memory.push(Message::tool(
                call.id.clone(),
                call.function.name.clone(),
                observation.clone(),
            ));
            results.push(observation);
        }

        Ok(results.join("\n\n"))
    }

    /// Run one call, then apply special-tool handling
    pub async fn execute_tool(&mut self, call: &ToolCall) -> String {
        let outcome = self.executor.execute(call).await;
        if let Some(args) = outcome.finish {
            self.handle_special_tool(&call.function.name, &args).await;
        }
        outcome.observation
    }

    async fn handle_special_tool(&mut self, name: &str, args: &Value) {
        info!("◆ SPECIAL TOOL '{}' CALLED, GENERATING FINAL SUMMARY", name);
        let status = args.get("status").and_then(Value::as_str);
        let request = self.summary_request(status);
        let summary = self.summaries.summarize(&request).await;
        self.store_summary(summary);
        self.transition(AgentState::Finished);
    }

    fn summary_request<'a>(&'a self, status: Option<&'a str>) -> SummaryRequest<'a> {
        let question = if self.question.is_empty() {
            self.memory.first_user_content().unwrap_or_default()
        } else {
            self.question.as_str()
        };
        SummaryRequest { question, status }
    }

    fn store_summary(&mut self, summary: Summary) {
        if summary.source == SummarySource::Primary {
            self.memory
                .push(Message::assistant(format!("FINAL ANSWER: {}", summary.answer)));
        }
        self.final_summary = Some(summary);
    }

    fn transition(&mut self, state: AgentState) {
        debug!("{}: {} -> {}", self.name, self.state, state);
        self.state = state;
    }
}
