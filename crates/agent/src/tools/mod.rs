//! Agent toolkit

pub mod browser;
pub mod chat_completion;
pub mod terminate;

pub use browser::BrowserUseTool;
pub use chat_completion::CreateChatCompletionTool;
pub use terminate::TerminateTool;

use async_trait::async_trait;
use fusion_provider::Tool;
use serde_json::Value;
use std::collections::HashMap;

use crate::AgentError;

type BoxedTool = Box<dyn ToolTrait + Send + Sync>;

#[async_trait]
pub trait ToolTrait: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;
    async fn execute(
        &self,
        args: Value,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;

    /// Whether running this tool (as a special tool) ends the run
    fn finishes_run(&self, _args: &Value, _output: &str) -> bool {
        false
    }
}

pub fn to_provider_tool(tool: &dyn ToolTrait) -> Tool {
    Tool::new(tool.name(), tool.description(), tool.parameters())
}

/// Tools by name, kept in registration order
pub struct ToolRegistry {
    tools: Vec<BoxedTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Registry holding the bundled toolkit
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        register_default_tools(&mut registry);
        registry
    }

    /// Add a tool; a tool with the same name is replaced in place
    pub fn register<T: ToolTrait + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = Box::new(tool),
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(Box::new(tool));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&(dyn ToolTrait + Send + Sync)> {
        self.index.get(name).map(|&slot| self.tools[slot].as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tool schemas advertised to the model
    pub fn to_params(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|t| to_provider_tool(t.as_ref()))
            .collect()
    }

    pub async fn execute(
        &self,
        name: &str,
        args: Value,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        tool.execute(args).await
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the bundled toolkit
pub fn register_default_tools(registry: &mut ToolRegistry) {
    registry.register(CreateChatCompletionTool);
    registry.register(BrowserUseTool::default());
    registry.register(TerminateTool);
}
