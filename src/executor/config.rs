// Executor configuration
#![allow(dead_code)]

use crate::executor::process::{DRAIN_WINDOW, KILL_GRACE_PERIOD};
use crate::executor::sandbox::resolve_canonical;
use crate::executor::types::ExecutionStatus;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Smallest per-stream output cap accepted at load time
pub const MIN_OUTPUT_BYTES: usize = 1024;

/// Largest timeout accepted at load time (one day)
pub const MAX_TIMEOUT_CEILING_SECS: u64 = 24 * 60 * 60;

/// Process-wide execution settings, read once at startup
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Master switch
    pub enabled: bool,
    pub python_executable: String,
    pub node_executable: String,
    pub default_timeout_secs: u64,
    pub max_timeout_secs: u64,
    /// Per-stream cap in bytes
    pub max_output_bytes: usize,
    /// Canonical roots; empty denies everything
    pub allowed_directories: Vec<PathBuf>,
    pub default_working_directory: PathBuf,
    /// Binary names permitted for `execute_command`; empty means unrestricted
    pub allowed_commands: Vec<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            python_executable: "python3".to_string(),
            node_executable: "node".to_string(),
            default_timeout_secs: 30,
            max_timeout_secs: 300,
            max_output_bytes: 1048576, // 1MB
            allowed_directories: Vec::new(),
            default_working_directory: std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("/")),
            allowed_commands: Vec::new(),
        }
    }
}

/// Parse a variable through `lookup`, logging a warning if the value is present but invalid.
fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(v) if !v.trim().is_empty() => match v.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(var = name, value = %v, "Invalid env var value, using default");
                default
            }
        },
        _ => default,
    }
}

fn parse_flag<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        _ => {
            warn!(var = name, value = %raw, "Invalid boolean env var, using default");
            default
        }
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl ExecutionConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ExecutionConfig::default();

        config.enabled = parse_flag(&lookup, "ENABLE_CODE_EXECUTION", config.enabled);
        if let Some(python) = lookup("PYTHON_EXECUTABLE").filter(|v| !v.trim().is_empty()) {
            config.python_executable = python.trim().to_string();
        }
        if let Some(node) = lookup("NODE_EXECUTABLE").filter(|v| !v.trim().is_empty()) {
            config.node_executable = node.trim().to_string();
        }
        config.default_timeout_secs = parse_var(
            &lookup,
            "EXEC_DEFAULT_TIMEOUT_SECONDS",
            config.default_timeout_secs,
        );
        config.max_timeout_secs =
            parse_var(&lookup, "EXEC_MAX_TIMEOUT_SECONDS", config.max_timeout_secs);
        config.max_output_bytes =
            parse_var(&lookup, "EXEC_MAX_OUTPUT_BYTES", config.max_output_bytes);

        if let Some(project) = lookup("PROJECT_PATH")
            .or_else(|| lookup("GIT_REPO_PATH"))
            .filter(|v| !v.trim().is_empty())
        {
            config.default_working_directory = PathBuf::from(project.trim());
        }

        if let Some(raw) = lookup("ALLOWED_DIRECTORIES") {
            config.allowed_directories = split_list(&raw).map(PathBuf::from).collect();
        }
        if let Some(raw) = lookup("EXEC_ALLOWED_COMMANDS") {
            config.allowed_commands = split_list(&raw).map(str::to_string).collect();
        }

        config.normalized()
    }

    /// Apply load-time clamping and canonicalize every path.
    ///
    /// Out-of-range values are clamped rather than rejected.
    pub fn normalized(mut self) -> Self {
        let defaults = ExecutionConfig::default();

        if self.max_timeout_secs == 0 {
            warn!(
                default = defaults.max_timeout_secs,
                "EXEC_MAX_TIMEOUT_SECONDS must be positive, using default"
            );
            self.max_timeout_secs = defaults.max_timeout_secs;
        }
        if self.max_timeout_secs > MAX_TIMEOUT_CEILING_SECS {
            warn!(
                max_timeout_secs = self.max_timeout_secs,
                ceiling = MAX_TIMEOUT_CEILING_SECS,
                "EXEC_MAX_TIMEOUT_SECONDS above ceiling, clamping"
            );
            self.max_timeout_secs = MAX_TIMEOUT_CEILING_SECS;
        }
        if self.default_timeout_secs == 0 {
            warn!(
                default = defaults.default_timeout_secs,
                "EXEC_DEFAULT_TIMEOUT_SECONDS must be positive, using default"
            );
            self.default_timeout_secs = defaults.default_timeout_secs;
        }
        if self.default_timeout_secs > self.max_timeout_secs {
            warn!(
                default_timeout_secs = self.default_timeout_secs,
                max_timeout_secs = self.max_timeout_secs,
                "default timeout exceeds maximum, clamping"
            );
            self.default_timeout_secs = self.max_timeout_secs;
        }
        if self.max_output_bytes < MIN_OUTPUT_BYTES {
            warn!(
                max_output_bytes = self.max_output_bytes,
                minimum = MIN_OUTPUT_BYTES,
                "output cap below minimum, clamping"
            );
            self.max_output_bytes = MIN_OUTPUT_BYTES;
        }

        let base = if self.default_working_directory.is_absolute() {
            self.default_working_directory.clone()
        } else {
            defaults.default_working_directory.join(&self.default_working_directory)
        };
        self.default_working_directory = resolve_canonical(&base);

        let mut allowed: Vec<PathBuf> = Vec::with_capacity(self.allowed_directories.len());
        for dir in &self.allowed_directories {
            let absolute = if dir.is_absolute() {
                dir.clone()
            } else {
                self.default_working_directory.join(dir)
            };
            let canonical = resolve_canonical(&absolute);
            if !allowed.contains(&canonical) {
                allowed.push(canonical);
            }
        }
        self.allowed_directories = allowed;

        self
    }

    /// Problems that make the configuration unusable for execution
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !self.enabled {
            issues.push("Code execution is disabled (ENABLE_CODE_EXECUTION)".to_string());
        }
        if self.allowed_directories.is_empty() {
            issues.push("No allowed directories configured (ALLOWED_DIRECTORIES)".to_string());
        }
        if self.default_timeout_secs < 1 || self.max_timeout_secs < 1 {
            issues.push("Timeouts must be at least 1 second".to_string());
        }
        if self.default_timeout_secs > self.max_timeout_secs {
            issues.push("Default timeout exceeds maximum timeout".to_string());
        }
        if self.max_output_bytes < MIN_OUTPUT_BYTES {
            issues.push(format!(
                "Maximum output size must be at least {} bytes",
                MIN_OUTPUT_BYTES
            ));
        }
        issues
    }

    /// Upper bound on how long one execution can take, escalation included
    pub fn longest_run(&self) -> Duration {
        Duration::from_secs(self.max_timeout_secs)
            .saturating_add(KILL_GRACE_PERIOD)
            .saturating_add(DRAIN_WINDOW)
    }

    pub fn is_valid(&self) -> bool {
        self.issues().is_empty()
    }

    pub fn status(&self) -> ExecutionStatus {
        let issues = self.issues();
        ExecutionStatus {
            enabled: self.enabled,
            python_executable: self.python_executable.clone(),
            node_executable: self.node_executable.clone(),
            default_timeout_seconds: self.default_timeout_secs,
            max_timeout_seconds: self.max_timeout_secs,
            max_output_bytes: self.max_output_bytes,
            allowed_directories: self.allowed_directories.clone(),
            default_working_directory: self.default_working_directory.clone(),
            allowed_commands: self.allowed_commands.clone(),
            valid: issues.is_empty(),
            issues,
        }
    }
}

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Execution settings shared by every tool
    pub execution: ExecutionConfig,
    /// Path to tools.toml configuration file
    pub tools_toml_path: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionConfig::default(),
            tools_toml_path: PathBuf::from("tools.toml"),
        }
    }
}

impl ExecutorConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let execution = ExecutionConfig::from_env();
        let tools_toml_path = std::env::var("EXEC_TOOLS_TOML")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("tools.toml"));

        Self {
            execution,
            tools_toml_path,
        }
    }

    pub fn tools_toml_path(&self) -> &Path {
        &self.tools_toml_path
    }
}
