// Error types for Executor module
#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure kinds reported inside an `ExecutionResult`.
///
/// Non-zero exits and timeouts are not errors: they are faithful reports of
/// what the child did and live in the result's other fields.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionError {
    #[error("{message}")]
    ConfigDisabled { message: String },

    #[error("{message}")]
    PathNotAllowed { message: String, path: String },

    #[error("{message}")]
    ExecutionFailed { message: String },
}

impl ExecutionError {
    pub fn disabled() -> Self {
        Self::ConfigDisabled {
            message: "Code execution is disabled. Set ENABLE_CODE_EXECUTION=true to enable it."
                .to_string(),
        }
    }

    pub fn path_not_allowed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PathNotAllowed {
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
        }
    }

    /// Stable kind name, matching the serialized `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigDisabled { .. } => "ConfigDisabled",
            Self::PathNotAllowed { .. } => "PathNotAllowed",
            Self::ExecutionFailed { .. } => "ExecutionFailed",
        }
    }
}

/// Executor (registry level) error types
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
