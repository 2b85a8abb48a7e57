//! Retrying completion gateway

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use fusion_config::{LlmSettings, RetrySettings};

use crate::protocol;
use crate::{format_messages, ChatRequest, Message, Provider, Result, Tool, ToolChoice};

/// Randomized exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            min_backoff: Duration::from_millis(settings.min_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget, no waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            min_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let min = self.min_backoff.as_millis() as u64;
        let max = (self.max_backoff.as_millis() as u64).max(min);

        let exponent = attempt.saturating_sub(1).min(32);
        let upper = min.saturating_mul(1u64 << exponent).clamp(min, max);

        if upper == min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::rng().random_range(min..=upper))
    }
}

/// Completion gateway handle: transport plus sampling settings
#[derive(Clone)]
pub struct Llm {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryPolicy,
}

impl Llm {
    pub fn new(provider: Arc<dyn Provider>, settings: &LlmSettings) -> Self {
        Self {
            provider,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            retry: RetryPolicy::default(),
        }
    }

    /// Handle sharing this transport but targeting another model
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    pub fn with_temperature(&self, temperature: f32) -> Self {
        Self {
            temperature,
            ..self.clone()
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Plain completion
    pub async fn ask(
        &self,
        messages: &[Message],
        system_messages: Option<&[Message]>,
        stream: bool,
        temperature: Option<f32>,
    ) -> Result<String> {
        let messages = format_messages(messages, system_messages)?;
        let request = self.request(messages, stream, temperature);
        self.send(request).await
    }

    /// Completion that may answer with in-band tool calls
    pub async fn ask_with_tools(
        &self,
        messages: &[Message],
        system_messages: Option<&[Message]>,
        tools: &[Tool],
        tool_choice: ToolChoice,
        temperature: Option<f32>,
    ) -> Result<Message> {
        let mut messages = format_messages(messages, system_messages)?;

        let use_tools = !tools.is_empty() && tool_choice != ToolChoice::None;
        if use_tools {
            protocol::inject_tool_instructions(&mut messages, tools);
            debug!(tools = tools.len(), %tool_choice, "Injected tool instructions");
        }

        let request = self.request(messages, false, temperature);
        let text = self.send(request).await?;

        if use_tools {
            Ok(protocol::decode_response(&text))
        } else {
            Ok(Message::assistant(text))
        }
    }

    fn request(&self, messages: Vec<Message>, stream: bool, temperature: Option<f32>) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages,
            stream,
            temperature: temperature.unwrap_or(self.temperature),
            max_tokens: self.max_tokens,
        }
    }

    async fn send(&self, request: ChatRequest) -> Result<String> {
        let max_attempts = self.retry.max_attempts.max(1);
        info!("◆ REQUESTING COMPLETION FROM {} ({})", self.model, self.provider.name());

        let mut attempt = 1;
        loop {
            match self.provider.chat(request.clone()).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "◆ COMPLETION FAILED, RETRYING: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempt, "◆ COMPLETION FAILED: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

impl std::fmt::Debug for Llm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Llm")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("retry", &self.retry)
            .finish()
    }
}
