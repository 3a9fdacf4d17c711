use crate::tools::types::ToolResult;
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

/// Performs the operation behind a tool name.
///
/// From the assistant's point of view an invocation is atomic: it either
/// yields a result or fails.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolResult, ToolError>;
}

/// Errors that can occur while invoking a tool
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Failed to spawn tool command: {0}")]
    Spawn(String),

    #[error("Tool {0} timed out")]
    Timeout(String),

    #[error("Tool {tool} failed with exit code {code}: {stderr}")]
    Failed { tool: String, code: i32, stderr: String },

    #[error("Tool {tool} produced invalid output: {reason}")]
    InvalidOutput { tool: String, reason: String },
}

/// Invoker that reports the call back instead of touching application state.
/// Used when no tool command is configured.
#[derive(Debug, Default, Clone)]
pub struct EchoInvoker;

#[async_trait]
impl ToolInvoker for EchoInvoker {
    async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolResult, ToolError> {
        Ok(ToolResult {
            output: json!({
                "tool": name,
                "arguments": arguments,
                "status": "ok"
            }),
        })
    }
}
