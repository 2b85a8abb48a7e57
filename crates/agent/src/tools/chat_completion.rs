//! create_chat_completion: structured final response

use async_trait::async_trait;
use serde_json::{json, Value};

use super::ToolTrait;
use crate::AgentError;

pub struct CreateChatCompletionTool;

#[async_trait]
impl ToolTrait for CreateChatCompletionTool {
    fn name(&self) -> &str {
        "create_chat_completion"
    }

    fn description(&self) -> &str {
        "Creates a structured completion with specified output formatting."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "response": {
                    "type": "string",
                    "description": "The response text that should be delivered to the user."
                }
            },
            "required": ["response"]
        })
    }

    async fn execute(
        &self,
        args: Value,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        match args.get("response") {
            Some(Value::String(text)) => Ok(text.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(AgentError::ToolExecution(
                "missing required argument 'response'".to_string(),
            )
            .into()),
        }
    }
}
