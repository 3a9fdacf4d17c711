
// Test utilities
use crate::tools::CommandInvoker;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Test helper to create a temporary directory
pub async fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Test helper to write a shell script standing in for the application's tool program
pub async fn create_tool_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("tool.sh");
    let script = format!("#!/bin/sh\n{}\n", body);
    fs::write(&path, script).await.expect("Failed to write tool script");
    path
}

/// Test helper to build an invoker that runs the script through `sh`
pub fn script_invoker(script: &Path) -> CommandInvoker {
    CommandInvoker::new(vec!["sh".to_string(), script.to_string_lossy().to_string()])
        .expect("Failed to build invoker")
        .with_timeout(Duration::from_secs(5))
}
