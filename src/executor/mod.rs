// Executor module - sandboxed process execution
#![allow(unused_imports)]

pub mod capture;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod file;
pub mod process;
pub mod runner;
pub mod sandbox;
pub mod snippet;
pub mod status;
pub mod tool;
pub mod types;

pub use capture::{CapturedOutput, OutputCapture, TRUNCATION_MARKER};
pub use config::{ExecutionConfig, ExecutorConfig};
pub use error::{ExecutionError, ExecutorError, Result};
pub use process::{ProcessExecutor, ProcessSpawner, run_process};
pub use runner::Executor;
pub use sandbox::{PathKind, PathValidator};
pub use tool::ToolImpl;
pub use types::{
    ExecutionMetadata, ExecutionResult, ExecutionStatus, Language, ProcessSpawnSpec,
    ToolDefinition, ToolOutput,
};
