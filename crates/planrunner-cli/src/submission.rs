//! Submission file format: a flat TOML list of requests to feed an
//! orchestrator session in one shot.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use planrunner_core::{Request, RequestConfig};

use crate::config::ResolvedConfig;

#[derive(Debug, Deserialize)]
pub struct SubmissionFile {
    #[serde(rename = "request", default)]
    pub requests: Vec<SubmissionEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SubmissionEntry {
    pub plan_ref: String,
    pub sub_range: Option<String>,
    pub task_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub auto_merge: bool,
}

/// Parse a submission file from disk.
pub fn load(path: &Path) -> Result<SubmissionFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read submission file at {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse submission file at {}", path.display()))
}

impl SubmissionFile {
    /// Turn every entry into a [`Request`], applying `config` defaults for
    /// fields the entry left unset.
    pub fn into_requests(self, config: &ResolvedConfig) -> Vec<Request> {
        self.requests
            .into_iter()
            .map(|entry| {
                let request_config = RequestConfig {
                    task_timeout: entry
                        .task_timeout_secs
                        .map(Duration::from_secs)
                        .unwrap_or(config.default_task_timeout),
                    max_retries: entry.max_retries.unwrap_or(config.default_max_retries),
                    auto_merge: entry.auto_merge,
                };
                let mut req = Request::new(entry.plan_ref, request_config);
                if let Some(sub_range) = entry.sub_range {
                    req = req.with_sub_range(sub_range);
                }
                req
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ResolvedConfig {
        ResolvedConfig {
            base_dir: "./worktrees".into(),
            worker_count: 4,
            primary_branch: "main".to_string(),
            default_task_timeout: Duration::from_secs(300),
            default_max_retries: 0,
            executor_command: "true".to_string(),
            executor_args: Vec::new(),
        }
    }

    #[test]
    fn parses_minimal_entry() {
        let toml = r#"
            [[request]]
            plan_ref = "plans/a.yaml"
        "#;
        let file: SubmissionFile = toml::from_str(toml).unwrap();
        assert_eq!(file.requests.len(), 1);
        let reqs = file.into_requests(&test_config());
        assert_eq!(reqs[0].plan_ref, "plans/a.yaml");
        assert_eq!(reqs[0].config.max_retries, 0);
    }

    #[test]
    fn entry_overrides_win_over_defaults() {
        let toml = r#"
            [[request]]
            plan_ref = "plans/a.yaml"
            sub_range = "1-5"
            max_retries = 3
            task_timeout_secs = 60
        "#;
        let file: SubmissionFile = toml::from_str(toml).unwrap();
        let reqs = file.into_requests(&test_config());
        assert_eq!(reqs[0].sub_range.as_deref(), Some("1-5"));
        assert_eq!(reqs[0].config.max_retries, 3);
        assert_eq!(reqs[0].config.task_timeout, Duration::from_secs(60));
    }
}
