// Tool trait and description overrides
#![allow(dead_code)]
#![allow(clippy::collapsible_if)]

use crate::executor::Result;
use crate::executor::types::{ToolDefinition, ToolOutput};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Internal trait for tool implementations
#[async_trait]
pub trait ToolImpl: Send + Sync {
    /// Get the tool definition (name, description, input_schema)
    fn definition(&self) -> ToolDefinition;

    /// Run the tool with JSON input. Failures are encoded in the output.
    async fn run(&self, input: serde_json::Value) -> ToolOutput;

    /// Get tool name
    fn name(&self) -> String {
        self.definition().name.clone()
    }
}

/// Load tool descriptions from TOML config file
///
/// ```toml
/// [execute_command]
/// description = "Run a program inside the project sandbox"
/// ```
pub fn load_tool_descriptions(path: &std::path::Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        debug!(path = %path.display(), "tools.toml not found, using default descriptions");
        return Ok(HashMap::new());
    }

    let content = std::fs::read_to_string(path)?;
    let config: toml::Table = content.parse()?;

    let mut descriptions = HashMap::new();

    for (key, value) in &config {
        if let Some(desc) = value.get("description") {
            if let Some(s) = desc.as_str() {
                descriptions.insert(key.clone(), s.to_string());
            }
        }
    }

    debug!(path = %path.display(), tool_count = descriptions.len(), "loaded tool descriptions from config");
    Ok(descriptions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_no_overrides() {
        let descriptions =
            load_tool_descriptions(std::path::Path::new("/nonexistent/tools.toml")).unwrap();
        assert!(descriptions.is_empty());
    }

    #[test]
    fn test_reads_descriptions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.toml");
        std::fs::write(
            &path,
            "[execute_command]\ndescription = \"custom\"\n\n[execute_file]\ntimeout = 3\n",
        )
        .unwrap();

        let descriptions = load_tool_descriptions(&path).unwrap();
        assert_eq!(descriptions.len(), 1);
        assert_eq!(descriptions["execute_command"], "custom");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.toml");
        std::fs::write(&path, "[execute_command\n").unwrap();

        assert!(load_tool_descriptions(&path).is_err());
    }
}
