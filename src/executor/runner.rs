// Main Executor implementation
#![allow(dead_code)]

use crate::executor::command::{self, CommandTool, default_command_description};
use crate::executor::config::{ExecutionConfig, ExecutorConfig};
use crate::executor::context::ExecutionContext;
use crate::executor::error::{ExecutionError, ExecutorError, Result};
use crate::executor::file::{self, FileTool, default_file_description};
use crate::executor::process::{ProcessExecutor, ProcessSpawner};
use crate::executor::snippet::{self, SnippetTool, default_snippet_description};
use crate::executor::status::{self, StatusTool, default_status_description};
use crate::executor::tool::ToolImpl;
use crate::executor::types::{ExecutionResult, ToolDefinition, ToolOutput};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry of execution tools.
///
/// Immutable after construction, so it can be shared across concurrent
/// invocations without locking.
pub struct Executor {
    config: Arc<ExecutionConfig>,
    tools: HashMap<String, Arc<dyn ToolImpl>>,
}

impl Executor {
    /// Create an executor that spawns real processes
    pub fn new(config: ExecutorConfig) -> Self {
        Self::init(config, Arc::new(ProcessExecutor))
    }

    /// Initialize with registered tools, routing every spawn through `spawner`
    pub fn init(config: ExecutorConfig, spawner: Arc<dyn ProcessSpawner>) -> Self {
        let execution = Arc::new(config.execution);
        debug!(
            enabled = execution.enabled,
            default_timeout_secs = execution.default_timeout_secs,
            max_timeout_secs = execution.max_timeout_secs,
            max_output_bytes = execution.max_output_bytes,
            allowed_directories = execution.allowed_directories.len(),
            "initializing executor"
        );

        // Load tool descriptions from config file
        let descriptions = crate::executor::tool::load_tool_descriptions(&config.tools_toml_path)
            .unwrap_or_else(|e| {
                warn!(path = %config.tools_toml_path.display(), error = %e, "ignoring unreadable tools.toml");
                HashMap::new()
            });
        let describe = |name: &str, fallback: fn() -> String| {
            descriptions.get(name).cloned().unwrap_or_else(fallback)
        };

        let context = Arc::new(ExecutionContext::new(Arc::clone(&execution), spawner));

        let registered: Vec<Arc<dyn ToolImpl>> = vec![
            Arc::new(CommandTool::new(
                describe(command::NAME, default_command_description),
                Arc::clone(&context),
            )),
            Arc::new(FileTool::new(
                describe(file::NAME, default_file_description),
                Arc::clone(&context),
            )),
            Arc::new(SnippetTool::new(
                describe(snippet::NAME, default_snippet_description),
                Arc::clone(&context),
            )),
            Arc::new(StatusTool::new(
                describe(status::NAME, default_status_description),
                Arc::clone(&context),
            )),
        ];

        let mut tools = HashMap::new();
        for tool in registered {
            tools.insert(tool.name(), tool);
        }

        info!(tool_count = tools.len(), enabled = execution.enabled, "executor initialized with tools");

        Self {
            config: execution,
            tools,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Get all tool definitions, sorted by name
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool by name with JSON input
    pub async fn execute(&self, tool_name: &str, input: serde_json::Value) -> Result<ToolOutput> {
        debug!(tool_name = %tool_name, "looking up tool");

        let tool = self
            .tools
            .get(tool_name)
            .cloned()
            .ok_or_else(|| ExecutorError::UnknownTool(tool_name.to_string()))?;

        info!(tool_name = %tool_name, "executing tool");
        Ok(tool.run(input).await)
    }

    /// Execute with JSON-text arguments, folding every failure into the output
    pub async fn call(&self, tool_name: &str, arguments: &str) -> ToolOutput {
        let input = if arguments.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            match serde_json::from_str(arguments) {
                Ok(value) => value,
                Err(e) => {
                    warn!(tool_name = %tool_name, error = %e, "invalid tool arguments");
                    return ToolOutput::Execution(ExecutionResult::from_error(
                        ExecutionError::failed(format!("Invalid arguments JSON: {}", e)),
                    ));
                }
            }
        };

        match self.execute(tool_name, input).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool_name = %tool_name, error = %e, "tool dispatch failed");
                ToolOutput::Execution(ExecutionResult::from_error(ExecutionError::failed(
                    e.to_string(),
                )))
            }
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}
