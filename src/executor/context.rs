// Shared plumbing for the execution tool handlers

use crate::executor::config::ExecutionConfig;
use crate::executor::error::ExecutionError;
use crate::executor::process::ProcessSpawner;
use crate::executor::sandbox::{PathKind, PathValidator};
use crate::executor::types::{ExecutionMetadata, ExecutionResult, Language, ProcessSpawnSpec};
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, info_span};
use uuid::Uuid;

/// Read-only state every handler needs
pub struct ExecutionContext {
    config: Arc<ExecutionConfig>,
    validator: PathValidator,
    spawner: Arc<dyn ProcessSpawner>,
}

impl ExecutionContext {
    pub fn new(config: Arc<ExecutionConfig>, spawner: Arc<dyn ProcessSpawner>) -> Self {
        let validator = PathValidator::from_config(&config);
        Self {
            config,
            validator,
            spawner,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn ensure_enabled(&self) -> Result<(), ExecutionError> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(ExecutionError::disabled())
        }
    }

    /// `min(requested or default, max)`, never below one second
    pub fn effective_timeout(&self, requested: Option<i64>) -> Duration {
        let secs = requested
            .map(|r| r.max(0) as u64)
            .unwrap_or(self.config.default_timeout_secs)
            .min(self.config.max_timeout_secs)
            .max(1);
        Duration::from_secs(secs)
    }

    /// Validate the requested working directory, or fall back to the configured default
    pub fn working_directory(&self, requested: Option<&str>) -> Result<PathBuf, ExecutionError> {
        let candidate = match requested.map(str::trim).filter(|s| !s.is_empty()) {
            Some(dir) => dir.to_string(),
            None => self.config.default_working_directory.to_string_lossy().into_owned(),
        };
        self.validator.validate(&candidate, PathKind::Directory)
    }

    pub fn validate_file(&self, path: &str) -> Result<PathBuf, ExecutionError> {
        self.validator.validate(path, PathKind::File)
    }

    pub fn interpreter(&self, language: Language) -> &str {
        match language {
            Language::Python => &self.config.python_executable,
            Language::Javascript => &self.config.node_executable,
        }
    }

    /// Build a spawn request with the configured output cap
    pub fn spec(
        &self,
        executable: impl Into<String>,
        cwd: PathBuf,
        timeout: Duration,
    ) -> ProcessSpawnSpec {
        ProcessSpawnSpec::new(executable, cwd, timeout, self.config.max_output_bytes)
    }

    /// Hand the spawn request to the process executor and tag the result
    pub async fn run(&self, tool: &str, spec: ProcessSpawnSpec) -> ExecutionResult {
        let execution_id = Uuid::new_v4();
        let metadata = ExecutionMetadata {
            execution_id,
            tool: tool.to_string(),
            executable: spec.executable.clone(),
            working_directory: spec.cwd.clone(),
            timeout_seconds: spec.timeout.as_secs(),
            started_at: Utc::now(),
        };

        let span = info_span!("execution", tool = %tool, execution_id = %execution_id);
        debug!(parent: &span, executable = %spec.executable, cwd = %spec.cwd.display(), "dispatching to process executor");

        self.spawner
            .execute(spec)
            .instrument(span)
            .await
            .with_metadata(metadata)
    }
}

/// Deserialize tool input, mapping failures to `ExecutionFailed`
pub fn parse_input<T: DeserializeOwned>(tool: &str, input: serde_json::Value) -> Result<T, ExecutionError> {
    let input = if input.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        input
    };
    serde_json::from_value(input)
        .map_err(|e| ExecutionError::failed(format!("Invalid input for tool '{}': {}", tool, e)))
}

/// Reject absent or blank required text fields
pub fn require(value: Option<String>, what: &str) -> Result<String, ExecutionError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ExecutionError::failed(format!("No {} provided", what))),
    }
}
