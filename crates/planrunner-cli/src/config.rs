//! Configuration file management for planrunner.
//!
//! Provides a TOML config file at `~/.config/planrunner/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub workspace: WorkspaceSection,
    pub defaults: DefaultsSection,
    pub executor: ExecutorSection,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            workspace: WorkspaceSection::default(),
            defaults: DefaultsSection::default(),
            executor: ExecutorSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSection {
    pub base_dir: PathBuf,
    pub worker_count: usize,
    pub primary_branch: String,
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./worktrees"),
            worker_count: 4,
            primary_branch: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsSection {
    pub task_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            task_timeout_secs: 300,
            max_retries: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// Command to run inside each acquired workspace (e.g. `"make"`).
    pub command: String,
    pub args: Vec<String>,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            command: "true".to_string(),
            args: Vec::new(),
        }
    }
}

/// Return the planrunner config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/planrunner` or
/// `~/.config/planrunner`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("planrunner");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("planrunner")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents).context("failed to parse config file")
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;
    Ok(())
}

/// Fully resolved configuration for one invocation of `planrunner run`.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_dir: PathBuf,
    pub worker_count: usize,
    pub primary_branch: String,
    pub default_task_timeout: Duration,
    pub default_max_retries: u32,
    pub executor_command: String,
    pub executor_args: Vec<String>,
}

/// CLI-flag overrides accepted by `planrunner run`. `None` means "not
/// provided on the command line".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub base_dir: Option<PathBuf>,
    pub worker_count: Option<usize>,
    pub primary_branch: Option<String>,
}

impl ResolvedConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    pub fn resolve(overrides: &CliOverrides) -> Result<Self> {
        let file_config = load_config().ok();
        let defaults = ConfigFile::default();
        let file = file_config.as_ref();

        let base_dir = overrides
            .base_dir
            .clone()
            .or_else(|| std::env::var("PLANRUNNER_BASE_DIR").ok().map(PathBuf::from))
            .or_else(|| file.map(|c| c.workspace.base_dir.clone()))
            .unwrap_or(defaults.workspace.base_dir);

        let worker_count = overrides
            .worker_count
            .or_else(|| std::env::var("PLANRUNNER_WORKERS").ok().and_then(|s| s.parse().ok()))
            .or_else(|| file.map(|c| c.workspace.worker_count))
            .unwrap_or(defaults.workspace.worker_count);

        let primary_branch = overrides
            .primary_branch
            .clone()
            .or_else(|| std::env::var("PLANRUNNER_PRIMARY_BRANCH").ok())
            .or_else(|| file.map(|c| c.workspace.primary_branch.clone()))
            .unwrap_or(defaults.workspace.primary_branch);

        let default_task_timeout = Duration::from_secs(
            file.map(|c| c.defaults.task_timeout_secs)
                .unwrap_or(defaults.defaults.task_timeout_secs),
        );
        let default_max_retries = file.map(|c| c.defaults.max_retries).unwrap_or(defaults.defaults.max_retries);

        let executor_command = file
            .map(|c| c.executor.command.clone())
            .unwrap_or(defaults.executor.command);
        let executor_args = file.map(|c| c.executor.args.clone()).unwrap_or(defaults.executor.args);

        Ok(Self {
            base_dir,
            worker_count,
            primary_branch,
            default_task_timeout,
            default_max_retries,
            executor_command,
            executor_args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_defaults_when_nothing_set() {
        let resolved = ResolvedConfig::resolve(&CliOverrides::default()).unwrap();
        assert_eq!(resolved.worker_count, 4);
        assert_eq!(resolved.primary_branch, "main");
    }

    #[test]
    fn cli_override_wins_over_default() {
        let overrides = CliOverrides {
            worker_count: Some(8),
            ..Default::default()
        };
        let resolved = ResolvedConfig::resolve(&overrides).unwrap();
        assert_eq!(resolved.worker_count, 8);
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(path.ends_with("planrunner/config.toml"));
    }
}
