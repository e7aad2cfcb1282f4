// Run an arbitrary command inside the sandbox

use crate::executor::context::{ExecutionContext, parse_input, require};
use crate::executor::error::ExecutionError;
use crate::executor::tool::ToolImpl;
use crate::executor::types::{ExecutionResult, ProcessSpawnSpec, ToolDefinition, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "execute_command";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandInput {
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    timeout_seconds: Option<i64>,
    working_directory: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

/// `execute_command` tool
pub struct CommandTool {
    description: String,
    context: Arc<ExecutionContext>,
}

impl CommandTool {
    pub fn new(description: impl Into<String>, context: Arc<ExecutionContext>) -> Self {
        Self {
            description: description.into(),
            context,
        }
    }

    fn check_allowed(&self, command: &str) -> Result<(), ExecutionError> {
        let allowed = &self.context.config().allowed_commands;
        if allowed.is_empty() {
            return Ok(());
        }

        let binary = Path::new(command)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| command.to_string());

        if allowed.iter().any(|a| a == &binary) {
            Ok(())
        } else {
            Err(ExecutionError::failed(format!(
                "Command not allowed: {}",
                binary
            )))
        }
    }

    fn prepare(&self, input: serde_json::Value) -> Result<ProcessSpawnSpec, ExecutionError> {
        self.context.ensure_enabled()?;

        let input: CommandInput = parse_input(NAME, input)?;
        let command = require(input.command, "command")?;
        let command = command.trim().to_string();
        self.check_allowed(&command)?;

        let timeout = self.context.effective_timeout(input.timeout_seconds);
        let cwd = self
            .context
            .working_directory(input.working_directory.as_deref())?;

        debug!(command = %command, args = ?input.args, "prepared command execution");

        let mut spec = self.context.spec(command, cwd, timeout).with_args(input.args);
        spec.env.extend(input.env);
        Ok(spec)
    }

    pub async fn execute(&self, input: serde_json::Value) -> ExecutionResult {
        match self.prepare(input) {
            Ok(spec) => self.context.run(NAME, spec).await,
            Err(e) => ExecutionResult::from_error(e),
        }
    }
}

#[async_trait]
impl ToolImpl for CommandTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.to_string(),
            description: self.description.clone(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Executable to run, resolved through PATH"
                    },
                    "args": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Arguments passed verbatim"
                    },
                    "timeoutSeconds": {
                        "type": "integer",
                        "description": "Wall-clock limit, capped by the server maximum"
                    },
                    "workingDirectory": {
                        "type": "string",
                        "description": "Directory inside the sandbox to run in"
                    },
                    "env": {
                        "type": "object",
                        "additionalProperties": { "type": "string" },
                        "description": "Extra environment variables"
                    }
                },
                "required": ["command"]
            }),
        }
    }

    async fn run(&self, input: serde_json::Value) -> ToolOutput {
        ToolOutput::Execution(self.execute(input).await)
    }
}

/// Default command tool description
pub fn default_command_description() -> String {
    r#"Run a program with arguments (no shell interpretation).
The working directory must lie inside the allowed directories.
Stdout and stderr are captured separately and capped in size.
The process is terminated if it exceeds its timeout."#
        .to_string()
}
