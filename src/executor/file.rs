// Run a script file through its interpreter

use crate::executor::context::{ExecutionContext, parse_input, require};
use crate::executor::error::ExecutionError;
use crate::executor::tool::ToolImpl;
use crate::executor::types::{
    ExecutionResult, Language, ProcessSpawnSpec, ToolDefinition, ToolOutput,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "execute_file";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInput {
    path: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    /// Overrides detection by extension
    language: Option<Language>,
    timeout_seconds: Option<i64>,
    working_directory: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

/// `execute_file` tool
pub struct FileTool {
    description: String,
    context: Arc<ExecutionContext>,
}

impl FileTool {
    pub fn new(description: impl Into<String>, context: Arc<ExecutionContext>) -> Self {
        Self {
            description: description.into(),
            context,
        }
    }

    fn prepare(&self, input: serde_json::Value) -> Result<ProcessSpawnSpec, ExecutionError> {
        self.context.ensure_enabled()?;

        let input: FileInput = parse_input(NAME, input)?;
        let path = require(input.path, "path")?;

        let timeout = self.context.effective_timeout(input.timeout_seconds);
        let script = self.context.validate_file(path.trim())?;
        let language = input
            .language
            .or_else(|| Language::from_path(&script))
            .ok_or_else(|| {
                ExecutionError::failed(format!(
                    "Unsupported file type: {} (expected .py, .js, .mjs or .cjs)",
                    path
                ))
            })?;
        let cwd = self
            .context
            .working_directory(input.working_directory.as_deref())?;

        let interpreter = self.context.interpreter(language).to_string();
        debug!(
            script = %script.display(),
            language = language.as_str(),
            interpreter = %interpreter,
            "prepared file execution"
        );

        let mut spec = self
            .context
            .spec(interpreter, cwd, timeout)
            .with_args([script.to_string_lossy().into_owned()])
            .with_args(input.args);
        if language == Language::Python {
            spec = spec.with_env("PYTHONUNBUFFERED", "1");
        }
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
impl ToolImpl for FileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.to_string(),
            description: self.description.clone(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Script to run; must exist inside the allowed directories"
                    },
                    "args": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Arguments passed after the script path"
                    },
                    "language": {
                        "type": "string",
                        "enum": ["python", "javascript"],
                        "description": "Interpreter override; detected from the extension by default"
                    },
                    "timeoutSeconds": { "type": "integer" },
                    "workingDirectory": { "type": "string" },
                    "env": {
                        "type": "object",
                        "additionalProperties": { "type": "string" }
                    }
                },
                "required": ["path"]
            }),
        }
    }

    async fn run(&self, input: serde_json::Value) -> ToolOutput {
        ToolOutput::Execution(self.execute(input).await)
    }
}

/// Default file tool description
pub fn default_file_description() -> String {
    r#"Run a Python (.py) or JavaScript (.js, .mjs, .cjs) file from the project.
The file must exist inside the allowed directories.
Stdout and stderr are captured separately and capped in size."#
        .to_string()
}
