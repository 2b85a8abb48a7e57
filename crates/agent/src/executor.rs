//! Tool call execution
//!
//! Resolves a decoded call against the registry and turns every outcome,
//! including malformed calls and tool failures, into an observation string.

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use fusion_provider::ToolCall;

use crate::tools::ToolRegistry;

const BROWSER_TOOL: &str = "browser_use";
const PLACEHOLDER_URL: &str = "https://example.com";

/// Result of executing one call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub observation: String,
    /// Arguments of a special tool whose finish predicate held
    pub finish: Option<Value>,
}

impl ToolOutcome {
    fn error(message: impl Into<String>) -> Self {
        Self {
            observation: message.into(),
            finish: None,
        }
    }
}

pub struct ToolExecutor {
    tools: ToolRegistry,
    special_tools: Vec<String>,
    max_observe: Option<usize>,
}

impl ToolExecutor {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            tools,
            special_tools: vec!["terminate".to_string()],
            max_observe: None,
        }
    }

    pub fn with_special_tools(mut self, names: Vec<String>) -> Self {
        self.special_tools = names;
        self
    }

    pub fn with_max_observe(mut self, max_observe: Option<usize>) -> Self {
        self.max_observe = max_observe;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn is_special(&self, name: &str) -> bool {
        self.special_tools
            .iter()
            .any(|special| special.eq_ignore_ascii_case(name))
    }

    /// Cap an observation at the configured length, in characters
    pub fn truncate(&self, observation: String) -> String {
        match self.max_observe {
            Some(limit) => match observation.char_indices().nth(limit) {
                Some((cut, _)) => observation[..cut].to_string(),
                None => observation,
            },
            None => observation,
        }
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolOutcome {
        let name = call.function.name.as_str();
        if name.is_empty() {
            return ToolOutcome::error("Error: Invalid command format");
        }
        if !self.tools.has(name) {
            return ToolOutcome::error(format!("Error: Unknown tool '{}'", name));
        }

        let args = match parse_arguments(&call.function.arguments) {
            Some(args) => args,
            None => {
                error!(
                    "Invalid JSON arguments for '{}': {}",
                    name, call.function.arguments
                );
                return ToolOutcome::error(format!(
                    "Error: Error parsing arguments for {}: Invalid JSON format",
                    name
                ));
            }
        };
        let args = Value::Object(default_browser_action(name, args));

        info!("◆ ACTIVATING TOOL '{}'", name);
        let (observation, raw) = match self.tools.execute(name, args.clone()).await {
            Ok(result) if result.is_empty() => {
                (format!("Cmd `{}` completed with no output", name), String::new())
            }
            Ok(result) => (
                format!("Observed output of cmd `{}` executed:\n{}", name, result),
                result,
            ),
            Err(e) => {
                error!("Tool '{}' failed: {}", name, e);
                (
                    format!("Error: Tool '{}' encountered a problem: {}", name, e),
                    e.to_string(),
                )
            }
        };

        let finish = self.special_finish(name, &args, &raw);
        ToolOutcome {
            observation,
            finish,
        }
    }

    fn special_finish(&self, name: &str, args: &Value, output: &str) -> Option<Value> {
        if !self.is_special(name) {
            return None;
        }
        let tool = self.tools.get(name)?;
        if tool.finishes_run(args, output) {
            info!("◆ SPECIAL TOOL '{}' COMPLETED THE TASK", name);
            Some(args.clone())
        } else {
            None
        }
    }
}

/// Arguments as a JSON object; an empty string means no arguments
fn parse_arguments(raw: &str) -> Option<Map<String, Value>> {
    let raw = if raw.trim().is_empty() { "{}" } else { raw };
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// A browser call without an action becomes a navigation
fn default_browser_action(name: &str, mut args: Map<String, Value>) -> Map<String, Value> {
    if name == BROWSER_TOOL && !args.contains_key("action") {
        args.insert("action".to_string(), Value::String("navigate".to_string()));
        args.entry("url")
            .or_insert_with(|| Value::String(PLACEHOLDER_URL.to_string()));
        warn!(
            "No action specified for {}, defaulting to navigate to {}",
            BROWSER_TOOL, args["url"]
        );
    }
    args
}
