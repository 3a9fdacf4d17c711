use crate::tools::invoker::{ToolError, ToolInvoker};
use crate::tools::registry::ToolRegistry;
use crate::tools::types::ToolResult;
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Invoker that hands each tool call to an external program.
///
/// The program is run as `<program> [args...] <tool-name>`, receives the
/// arguments as JSON on stdin and must print a JSON value on stdout. A
/// non-zero exit status fails the call with the program's stderr.
pub struct CommandInvoker {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    registry: &'static ToolRegistry,
}

impl CommandInvoker {
    pub fn new(command: Vec<String>) -> Result<Self, ToolError> {
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| ToolError::Spawn("Empty command".to_string()))?;

        Ok(Self {
            program,
            args: parts.collect(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            registry: ToolRegistry::global(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl ToolInvoker for CommandInvoker {
    async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolResult, ToolError> {
        self.registry.validate_args(name, &arguments)?;

        let payload = serde_json::to_vec(&arguments).map_err(|e| ToolError::InvalidArguments {
            tool: name.to_string(),
            reason: e.to_string(),
        })?;

        let start = Instant::now();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| ToolError::Spawn(format!("{}: {}", self.program, e)))?;

        // Write stdin concurrently with reading stdout
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    tracing::debug!("tool command closed stdin early: {}", e);
                }
            });
        }

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ToolError::Spawn(format!("Process wait error: {}", e))),
            // Dropping the child kills it
            Err(_) => return Err(ToolError::Timeout(name.to_string())),
        };

        tracing::debug!(
            tool = name,
            duration_ms = start.elapsed().as_millis() as u64,
            "tool command finished"
        );

        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: name.to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Ok(ToolResult { output: Value::Null });
        }

        let output = serde_json::from_str(stdout).map_err(|e| ToolError::InvalidOutput {
            tool: name.to_string(),
            reason: e.to_string(),
        })?;

        Ok(ToolResult { output })
    }
}
