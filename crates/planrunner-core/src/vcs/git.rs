//! Real `git` implementation of [`super::Vcs`].

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use super::Vcs;

/// Shells out to `git` for every operation, each bounded by
/// [`GitVcs::command_timeout`] and run on a blocking thread so it never
/// stalls the async runtime.
#[derive(Debug, Clone)]
pub struct GitVcs {
    repo_path: PathBuf,
    primary_branch: String,
    command_timeout: Duration,
}

impl GitVcs {
    /// Create a new `GitVcs` rooted at `repo_path`.
    ///
    /// Verifies `repo_path` is a git repository by running
    /// `git rev-parse --git-dir`.
    pub async fn new(repo_path: impl Into<PathBuf>, primary_branch: impl Into<String>) -> Result<Self> {
        let repo_path = repo_path.into();
        let check_path = repo_path.clone();
        let output = tokio::task::spawn_blocking(move || {
            Command::new("git")
                .args(["rev-parse", "--git-dir"])
                .current_dir(&check_path)
                .output()
        })
        .await
        .context("failed to join git rev-parse task")?
        .context("failed to spawn git rev-parse")?;

        if !output.status.success() {
            bail!("not a git repository: {}", repo_path.display());
        }

        Ok(Self {
            repo_path,
            primary_branch: primary_branch.into(),
            command_timeout: Duration::from_secs(60),
        })
    }

    /// Override the default 60s per-command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Run a git command with `cwd` as the working directory, bounded by
    /// `command_timeout`.
    async fn run(&self, cwd: &Path, args: &[&str]) -> Result<String> {
        let cwd = cwd.to_path_buf();
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let command_label = args.join(" ");

        let fut = tokio::task::spawn_blocking(move || {
            Command::new("git").args(&args).current_dir(&cwd).output()
        });

        let output = match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(joined) => joined.context("failed to join git task")?.context("failed to spawn git")?,
            Err(_) => bail!("git {command_label} timed out after {:?}", self.command_timeout),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {command_label} failed: {stderr}");
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Vcs for GitVcs {
    async fn add_worktree(&self, path: &Path, branch: &str, from_ref: &str) -> Result<()> {
        let path_str = path.to_string_lossy().into_owned();
        self.run(
            &self.repo_path,
            &["worktree", "add", "-b", branch, &path_str, from_ref],
        )
        .await
        .with_context(|| format!("failed to add worktree at {}", path.display()))?;
        Ok(())
    }

    async fn remove_worktree(&self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy().into_owned();
        // Best-effort: an already-removed worktree is not an error.
        let result = self
            .run(&self.repo_path, &["worktree", "remove", "--force", &path_str])
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("is not a working tree") => Ok(()),
            Err(e) => {
                if path.exists() {
                    let _ = std::fs::remove_dir_all(path);
                }
                let _ = self.run(&self.repo_path, &["worktree", "prune"]).await;
                Err(e)
            }
        }
    }

    async fn list_branches(&self, path: &Path) -> Result<Vec<String>> {
        let stdout = self
            .run(path, &["branch", "--list", "--format=%(refname:short)"])
            .await?;
        Ok(stdout.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    async fn delete_branch(&self, path: &Path, branch: &str) -> Result<()> {
        match self.run(path, &["branch", "-D", branch]).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("not found") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn checkout_force(&self, path: &Path, branch: &str) -> Result<()> {
        self.run(path, &["checkout", "-f", branch]).await?;
        Ok(())
    }

    async fn hard_reset(&self, path: &Path, to_ref: &str) -> Result<()> {
        self.run(path, &["reset", "--hard", to_ref]).await?;
        Ok(())
    }

    async fn clean(&self, path: &Path) -> Result<()> {
        self.run(path, &["clean", "-fd"]).await?;
        Ok(())
    }

    async fn integrity_check(&self, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        Ok(self.run(path, &["rev-parse", "--is-inside-work-tree"]).await.is_ok())
    }

    fn primary_branch(&self) -> &str {
        &self.primary_branch
    }
}
