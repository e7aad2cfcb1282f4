// Read-only execution status tool

use crate::executor::context::ExecutionContext;
use crate::executor::tool::ToolImpl;
use crate::executor::types::{ToolDefinition, ToolOutput};
use async_trait::async_trait;
use std::sync::Arc;

pub const NAME: &str = "execution_status";

/// `execution_status` tool; answers even when execution is disabled
pub struct StatusTool {
    description: String,
    context: Arc<ExecutionContext>,
}

impl StatusTool {
    pub fn new(description: impl Into<String>, context: Arc<ExecutionContext>) -> Self {
        Self {
            description: description.into(),
            context,
        }
    }
}

#[async_trait]
impl ToolImpl for StatusTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.to_string(),
            description: self.description.clone(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    async fn run(&self, _input: serde_json::Value) -> ToolOutput {
        ToolOutput::Status(self.context.config().status())
    }
}

/// Default status tool description
pub fn default_status_description() -> String {
    "Report whether code execution is enabled and how it is configured.".to_string()
}
