//! Concrete [`TaskExecutor`] that shells out to a configured command
//! inside the acquired workspace.
//!
//! This is the default adapter wired up by `planrunner run`; it knows
//! nothing about plan parsing or VCS -- it just runs a command and
//! interprets its exit status.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use planrunner_core::{ExecutionOutcome, Request, TaskExecutor};

/// Runs `command args...` with the working directory set to the
/// workspace path, and `PLANRUNNER_PLAN_REF` / `PLANRUNNER_SUB_RANGE`
/// exported so the command can act on the request.
pub struct ShellExecutor {
    command: String,
    args: Vec<String>,
}

impl ShellExecutor {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl TaskExecutor for ShellExecutor {
    async fn execute(&self, workspace_path: &Path, request: &Request) -> anyhow::Result<ExecutionOutcome> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .current_dir(workspace_path)
            .env("PLANRUNNER_PLAN_REF", &request.plan_ref)
            .env("PLANRUNNER_SUB_RANGE", request.sub_range.as_deref().unwrap_or(""));

        let output = cmd.output().await?;

        if output.status.success() {
            Ok(ExecutionOutcome::success(1))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            Ok(ExecutionOutcome::failure(format!(
                "command exited with {}: {}{}",
                output.status, stdout, stderr
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planrunner_core::RequestConfig;

    #[tokio::test]
    async fn success_exit_code_yields_passed_outcome() {
        let executor = ShellExecutor::new("true", Vec::new());
        let req = Request::new("plans/a.yaml", RequestConfig::default());
        let outcome = executor.execute(Path::new("."), &req).await.unwrap();
        assert!(outcome.passed);
    }

    #[tokio::test]
    async fn failure_exit_code_yields_failed_outcome() {
        let executor = ShellExecutor::new("false", Vec::new());
        let req = Request::new("plans/a.yaml", RequestConfig::default());
        let outcome = executor.execute(Path::new("."), &req).await.unwrap();
        assert!(!outcome.passed);
        assert!(outcome.error.is_some());
    }
}
