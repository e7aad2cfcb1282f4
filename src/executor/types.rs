// Data types for Executor module
#![allow(dead_code)]

use crate::executor::capture::{body_len, clip_text};
use crate::executor::error::ExecutionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Tool definition handed to the planning layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "input_schema")]
    pub input_schema: serde_json::Value,
}

/// Interpreter family for snippets and files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[serde(alias = "py")]
    Python,
    #[serde(alias = "js", alias = "node")]
    Javascript,
}

impl Language {
    /// Pick the interpreter family from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "py" => Some(Self::Python),
            "js" | "mjs" | "cjs" => Some(Self::Javascript),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
        }
    }
}

/// Everything needed to spawn one child process
#[derive(Debug, Clone)]
pub struct ProcessSpawnSpec {
    pub executable: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Merged over the parent environment
    pub env: HashMap<String, String>,
    pub timeout: Duration,
    /// Per-stream cap
    pub max_output_bytes: usize,
    /// Written to the child's stdin, which is then closed
    pub stdin: Option<String>,
}

impl ProcessSpawnSpec {
    pub fn new(
        executable: impl Into<String>,
        cwd: impl Into<PathBuf>,
        timeout: Duration,
        max_output_bytes: usize,
    ) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: HashMap::new(),
            timeout,
            max_output_bytes,
            stdin: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }
}

/// Handler-specific details attached to a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    pub execution_id: Uuid,
    pub tool: String,
    pub executable: String,
    pub working_directory: PathBuf,
    pub timeout_seconds: u64,
    pub started_at: DateTime<Utc>,
}

/// Terminal description of a single execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExecutionMetadata>,
}

impl ExecutionResult {
    /// Result for a request that never reached the process executor
    pub fn from_error(error: ExecutionError) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: error.to_string(),
            exit_code: -1,
            duration_ms: 0,
            timed_out: false,
            truncated: false,
            error: Some(error),
            metadata: None,
        }
    }

    /// Result for a child that could not be started
    pub fn spawn_failure(executable: &str, err: &std::io::Error, elapsed: Duration) -> Self {
        let message = format!("Failed to spawn '{}': {}", executable, err);
        Self {
            success: false,
            stdout: String::new(),
            stderr: message.clone(),
            exit_code: -1,
            duration_ms: elapsed.as_millis() as u64,
            timed_out: false,
            truncated: false,
            error: Some(ExecutionError::failed(message)),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ExecutionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Read-only view of the active execution configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatus {
    pub enabled: bool,
    pub python_executable: String,
    pub node_executable: String,
    pub default_timeout_seconds: u64,
    pub max_timeout_seconds: u64,
    pub max_output_bytes: usize,
    pub allowed_directories: Vec<PathBuf>,
    pub default_working_directory: PathBuf,
    pub allowed_commands: Vec<String>,
    /// True when every check passes
    pub valid: bool,
    pub issues: Vec<String>,
}

/// Output from a tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Execution(ExecutionResult),
    Status(ExecutionStatus),
}

impl ToolOutput {
    pub fn is_error(&self) -> bool {
        match self {
            ToolOutput::Execution(result) => !result.success,
            ToolOutput::Status(_) => false,
        }
    }

    pub fn as_execution(&self) -> Option<&ExecutionResult> {
        match self {
            ToolOutput::Execution(result) => Some(result),
            ToolOutput::Status(_) => None,
        }
    }

    pub fn into_execution(self) -> Option<ExecutionResult> {
        match self {
            ToolOutput::Execution(result) => Some(result),
            ToolOutput::Status(_) => None,
        }
    }

    /// Serialize to JSON no longer than `limit` bytes where possible.
    ///
    /// Oversized execution results keep the same share of each stream and
    /// are flagged `truncated`. Status output is returned as is.
    pub fn to_json_within(&self, limit: usize) -> serde_json::Result<String> {
        let json = serde_json::to_string(self)?;
        let ToolOutput::Execution(result) = self else {
            return Ok(json);
        };
        if json.len() <= limit {
            return Ok(json);
        }

        let stdout_len = body_len(&result.stdout);
        let stderr_len = body_len(&result.stderr);
        let clipped = |share: u64| {
            let mut fitted = result.clone();
            fitted.clip_streams(
                scaled(stdout_len, share),
                scaled(stderr_len, share),
            );
            serde_json::to_string(&fitted)
        };

        // Bisect for the largest common share of each stream that fits
        let mut best = clipped(0)?;
        let (mut fits, mut overflows) = (0, FULL_SHARE);
        while overflows - fits > 1 {
            let share = (fits + overflows) / 2;
            let candidate = clipped(share)?;
            if candidate.len() <= limit {
                fits = share;
                best = candidate;
            } else {
                overflows = share;
            }
        }
        Ok(best)
    }
}

const FULL_SHARE: u64 = 1 << 16;

fn scaled(len: usize, share: u64) -> usize {
    (len as u128 * share as u128 / FULL_SHARE as u128) as usize
}

impl ExecutionResult {
    /// Clip each stream to the given number of output bytes
    pub fn clip_streams(&mut self, max_stdout: usize, max_stderr: usize) {
        let stdout_cut = clip_text(&mut self.stdout, max_stdout);
        let stderr_cut = clip_text(&mut self.stderr, max_stderr);
        if stdout_cut || stderr_cut {
            self.truncated = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::capture::TRUNCATION_MARKER;

    #[test]
    fn test_language_from_extension() {
        assert_eq!(Language::from_path(Path::new("/a/b.py")), Some(Language::Python));
        assert_eq!(Language::from_path(Path::new("x.MJS")), Some(Language::Javascript));
        assert_eq!(Language::from_path(Path::new("x.cjs")), Some(Language::Javascript));
        assert_eq!(Language::from_path(Path::new("x.rb")), None);
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_language_aliases() {
        let lang: Language = serde_json::from_str("\"node\"").unwrap();
        assert_eq!(lang, Language::Javascript);
        let lang: Language = serde_json::from_str("\"py\"").unwrap();
        assert_eq!(lang, Language::Python);
        assert!(serde_json::from_str::<Language>("\"ruby\"").is_err());
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = ExecutionResult::from_error(ExecutionError::path_not_allowed(
            "/etc/passwd",
            "Path is outside the allowed directories: /etc/passwd",
        ));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["exitCode"], -1);
        assert_eq!(json["timedOut"], false);
        assert_eq!(json["error"]["type"], "PathNotAllowed");
        assert_eq!(json["error"]["path"], "/etc/passwd");
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_spawn_failure_shape() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory");
        let result = ExecutionResult::spawn_failure("nope", &err, Duration::from_millis(3));

        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert!(!result.timed_out);
        assert!(result.stderr.contains("No such file or directory"));
        assert_eq!(result.error.as_ref().map(|e| e.kind()), Some("ExecutionFailed"));
    }

    #[test]
    fn test_tool_output_untagged_roundtrip() {
        let output = ToolOutput::Execution(ExecutionResult::from_error(ExecutionError::disabled()));
        let text = serde_json::to_string(&output).unwrap();
        let back: ToolOutput = serde_json::from_str(&text).unwrap();

        assert!(back.is_error());
        assert_eq!(back, output);
    }

    fn big_result(stdout: String, stderr: String) -> ToolOutput {
        ToolOutput::Execution(ExecutionResult {
            success: true,
            stdout,
            stderr,
            exit_code: 0,
            duration_ms: 12,
            timed_out: false,
            truncated: false,
            error: None,
            metadata: None,
        })
    }

    #[test]
    fn test_json_within_leaves_small_output_alone() {
        let output = big_result("hello\n".into(), String::new());
        let json = output.to_json_within(1024).unwrap();
        assert_eq!(json, serde_json::to_string(&output).unwrap());
    }

    #[test]
    fn test_json_within_clips_both_streams() {
        let output = big_result("a".repeat(100_000), "b".repeat(10_000));
        let json = output.to_json_within(20_000).unwrap();
        assert!(json.len() <= 20_000, "{} bytes", json.len());

        let result: ExecutionResult = serde_json::from_str(&json).unwrap();
        assert!(result.success);
        assert!(result.truncated);
        assert!(result.stdout.starts_with("aaaa"));
        assert!(result.stdout.ends_with(TRUNCATION_MARKER));
        assert!(result.stderr.starts_with("bbbb"));
        assert!(result.stderr.ends_with(TRUNCATION_MARKER));
        // Most of the budget still goes to output
        assert!(result.stdout.len() > 15_000, "{}", result.stdout.len());
        assert_eq!(result.stdout.matches("[OUTPUT TRUNCATED").count(), 1);
    }

    #[test]
    fn test_json_within_handles_escaped_and_multibyte_output() {
        let output = big_result("\u{1}".repeat(20_000), "é".repeat(20_000));
        let json = output.to_json_within(8_000).unwrap();
        assert!(json.len() <= 8_000, "{} bytes", json.len());

        let result: ExecutionResult = serde_json::from_str(&json).unwrap();
        assert!(result.truncated);
        assert!(result.stderr.starts_with('é'));
    }

    #[test]
    fn test_json_within_keeps_already_truncated_marker_single() {
        let stdout = format!("{}{}", "x".repeat(50_000), TRUNCATION_MARKER);
        let mut output = big_result(stdout, String::new());
        if let ToolOutput::Execution(result) = &mut output {
            result.truncated = true;
        }
        let json = output.to_json_within(4_000).unwrap();

        let result: ExecutionResult = serde_json::from_str(&json).unwrap();
        assert!(json.len() <= 4_000);
        assert_eq!(result.stdout.matches("[OUTPUT TRUNCATED").count(), 1);
    }

    #[test]
    fn test_json_within_passes_status_through() {
        let output = ToolOutput::Status(ExecutionStatus {
            enabled: false,
            python_executable: "python3".into(),
            node_executable: "node".into(),
            default_timeout_seconds: 30,
            max_timeout_seconds: 300,
            max_output_bytes: 1024 * 1024,
            allowed_directories: Vec::new(),
            default_working_directory: PathBuf::from("/tmp"),
            allowed_commands: Vec::new(),
            valid: false,
            issues: vec!["no allowed directories".into()],
        });
        let json = output.to_json_within(10).unwrap();
        assert_eq!(json, serde_json::to_string(&output).unwrap());
    }
}
