// Run an inline code snippet
//
// The code is piped to the interpreter on stdin and never written to disk.

use crate::executor::context::{ExecutionContext, parse_input, require};
use crate::executor::error::ExecutionError;
use crate::executor::tool::ToolImpl;
use crate::executor::types::{
    ExecutionResult, Language, ProcessSpawnSpec, ToolDefinition, ToolOutput,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "execute_code";

/// Environment variable carrying the snippet's `args` object as JSON
pub const CODE_ARGS_ENV: &str = "SANDEXEC_CODE_ARGS";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnippetInput {
    code: Option<String>,
    #[serde(default)]
    language: Option<Language>,
    #[serde(default)]
    args: Option<serde_json::Map<String, serde_json::Value>>,
    timeout_seconds: Option<i64>,
    working_directory: Option<String>,
}

/// `execute_code` tool
pub struct SnippetTool {
    description: String,
    context: Arc<ExecutionContext>,
}

impl SnippetTool {
    pub fn new(description: impl Into<String>, context: Arc<ExecutionContext>) -> Self {
        Self {
            description: description.into(),
            context,
        }
    }

    fn prepare(&self, input: serde_json::Value) -> Result<ProcessSpawnSpec, ExecutionError> {
        self.context.ensure_enabled()?;

        let input: SnippetInput = parse_input(NAME, input)?;
        let code = require(input.code, "code")?;
        let language = input.language.unwrap_or(Language::Python);

        let timeout = self.context.effective_timeout(input.timeout_seconds);
        let cwd = self
            .context
            .working_directory(input.working_directory.as_deref())?;

        let interpreter = self.context.interpreter(language).to_string();
        debug!(
            language = language.as_str(),
            interpreter = %interpreter,
            code_bytes = code.len(),
            "prepared snippet execution"
        );

        // "-" makes both interpreters read the program from stdin
        let mut spec = self
            .context
            .spec(interpreter, cwd, timeout)
            .with_args(["-"])
            .with_stdin(code);
        if language == Language::Python {
            spec = spec.with_env("PYTHONUNBUFFERED", "1");
        }
        if let Some(args) = input.args {
            let encoded = serde_json::Value::Object(args).to_string();
            spec = spec.with_env(CODE_ARGS_ENV, encoded);
        }
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
impl ToolImpl for SnippetTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.to_string(),
            description: self.description.clone(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "Source code to run"
                    },
                    "language": {
                        "type": "string",
                        "enum": ["python", "javascript"],
                        "description": "Defaults to python"
                    },
                    "args": {
                        "type": "object",
                        "description": "Exposed to the program as JSON in SANDEXEC_CODE_ARGS"
                    },
                    "timeoutSeconds": { "type": "integer" },
                    "workingDirectory": { "type": "string" }
                },
                "required": ["code"]
            }),
        }
    }

    async fn run(&self, input: serde_json::Value) -> ToolOutput {
        ToolOutput::Execution(self.execute(input).await)
    }
}

/// Default snippet tool description
pub fn default_snippet_description() -> String {
    r#"Run a short Python or JavaScript snippet.
The code is passed to the interpreter on stdin; nothing is written to disk.
An optional args object is available as JSON in the SANDEXEC_CODE_ARGS environment variable."#
        .to_string()
}
