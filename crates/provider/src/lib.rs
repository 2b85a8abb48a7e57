//! GATEWAY: Completion endpoint access
//!
//! Message model, the in-band tool-call protocol, and a retrying gateway over
//! plain text-completion endpoints that have no native function calling.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub mod gateway;
pub mod ollama;
pub mod protocol;
pub mod registry;

pub use gateway::{Llm, RetryPolicy};
pub use ollama::{ModelInfo, OllamaProvider};
pub use registry::{LlmRegistry, ProviderFactory};

/// Gateway errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("VALIDATION ERROR: {0}")]
    Validation(String),

    #[error("REQUEST FAILED: {0}")]
    Request(#[from] reqwest::Error),

    #[error("MALFORMED JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ENDPOINT REJECTED ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("INVALID RESPONSE: {0}")]
    InvalidResponse(String),

    #[error("TIMED OUT AFTER {0}s")]
    Timeout(u64),

    #[error("CONFIG ERROR: {0}")]
    Config(#[from] fusion_config::ConfigError),
}

impl ProviderError {
    /// Communication failures are worth another attempt; bad input never is.
    /// Client rejections other than 408 and 429 repeat on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Validation(_) | ProviderError::Config(_) => false,
            ProviderError::Api { status, .. } => {
                !(400..500).contains(status) || matches!(status, 408 | 429)
            }
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Accepted message roles
pub const ROLE_VALUES: &[&str] = &["system", "user", "assistant", "tool"];

/// Conversation entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: &str, content: Option<String>) -> Self {
        Self {
            role: role.to_string(),
            content,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", Some(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", Some(content.into()))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", Some(content.into()))
    }

    /// Assistant message that invokes tools
    pub fn from_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::with_role("assistant", content)
        }
    }

    pub fn tool(
        call_id: impl Into<String>,
        name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
            ..Self::with_role("tool", Some(result.into()))
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }

    /// Tool calls carried by this message, empty when there are none
    pub fn calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }

    /// Check the role and the content-or-tool-calls invariant
    pub fn validate(&self) -> Result<()> {
        if self.role.is_empty() {
            return Err(ProviderError::Validation(
                "Message must contain a 'role' field".to_string(),
            ));
        }
        if !ROLE_VALUES.contains(&self.role.as_str()) {
            return Err(ProviderError::Validation(format!(
                "Invalid role: {}",
                self.role
            )));
        }
        if self.content.is_none() && self.tool_calls.is_none() {
            return Err(ProviderError::Validation(
                "Message must contain either 'content' or 'tool_calls'".to_string(),
            ));
        }
        Ok(())
    }
}

/// Merge system messages ahead of the conversation, validating every entry
pub fn format_messages(
    messages: &[Message],
    system_messages: Option<&[Message]>,
) -> Result<Vec<Message>> {
    let mut formatted = Vec::with_capacity(
        messages.len() + system_messages.map(|s| s.len()).unwrap_or_default(),
    );
    formatted.extend(system_messages.unwrap_or_default().iter().cloned());
    formatted.extend(messages.iter().cloned());

    for message in &formatted {
        message.validate()?;
    }

    Ok(formatted)
}

/// Structured function call decoded from model text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Function name plus its arguments, serialized as a JSON string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Tool specification advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Function schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool selection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    None,
    #[default]
    Auto,
    Required,
}

impl ToolChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolChoice::None => "none",
            ToolChoice::Auto => "auto",
            ToolChoice::Required => "required",
        }
    }
}

impl fmt::Display for ToolChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolChoice {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(ToolChoice::None),
            "auto" => Ok(ToolChoice::Auto),
            "required" => Ok(ToolChoice::Required),
            other => Err(ProviderError::Validation(format!(
                "Invalid tool_choice: {}",
                other
            ))),
        }
    }
}

/// Request handed to the transport
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Completion endpoint transport
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send one request and return the full response text
    async fn chat(&self, request: ChatRequest) -> Result<String>;
    fn name(&self) -> &str;
}
