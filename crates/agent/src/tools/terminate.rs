//! terminate: end the interaction

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::ToolTrait;

pub struct TerminateTool;

#[derive(Deserialize)]
struct TerminateArgs {
    #[serde(default = "default_status")]
    status: String,
}

fn default_status() -> String {
    "success".to_string()
}

#[async_trait]
impl ToolTrait for TerminateTool {
    fn name(&self) -> &str {
        "terminate"
    }

    fn description(&self) -> &str {
        "Terminate the interaction when the request is met OR if the assistant cannot proceed further with the task."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "description": "The finish status of the interaction.",
                    "enum": ["success", "failure"]
                }
            },
            "required": ["status"]
        })
    }

    async fn execute(
        &self,
        args: Value,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let args: TerminateArgs = serde_json::from_value(args)?;
        Ok(format!(
            "The interaction has been completed with status: {}",
            args.status
        ))
    }

    fn finishes_run(&self, _args: &Value, _output: &str) -> bool {
        true
    }
}
