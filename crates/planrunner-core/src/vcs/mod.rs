//! Version-control capability consumed by the workspace pool.
//!
//! The pool depends only on this trait; it never shells out to `git`
//! directly. [`GitVcs`] is the real, process-spawning implementation;
//! [`fake::FakeVcs`] is an in-memory double used by pool/queue/worker/
//! orchestrator tests so they don't need a real repository on disk.

mod git;
pub mod fake;

pub use fake::FakeVcs;
pub use git::GitVcs;

use std::path::Path;

use async_trait::async_trait;

/// Capability required by [`crate::pool::WorkspacePool`] to create, clean,
/// and tear down linked working trees of a single repository.
///
/// Every method corresponds 1:1 to a single git worktree/branch primitive.
/// Implementations should bound each invocation with an internal timeout
/// (30-60s typical for a real `git` subprocess) rather than hang
/// indefinitely.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Add a linked working tree at `path` on a new branch `branch`,
    /// based on `from_ref` (typically the repository's primary branch).
    async fn add_worktree(&self, path: &Path, branch: &str, from_ref: &str) -> anyhow::Result<()>;

    /// Remove the linked working tree at `path` (force).
    async fn remove_worktree(&self, path: &Path) -> anyhow::Result<()>;

    /// List local branch names.
    async fn list_branches(&self, path: &Path) -> anyhow::Result<Vec<String>>;

    /// Delete a local branch. Idempotent: deleting a branch that does not
    /// exist is not an error.
    async fn delete_branch(&self, path: &Path, branch: &str) -> anyhow::Result<()>;

    /// Force-checkout `branch` in the working tree at `path`.
    async fn checkout_force(&self, path: &Path, branch: &str) -> anyhow::Result<()>;

    /// Hard-reset the working tree at `path` to `to_ref`.
    async fn hard_reset(&self, path: &Path, to_ref: &str) -> anyhow::Result<()>;

    /// Remove untracked files and directories from the working tree at
    /// `path`.
    async fn clean(&self, path: &Path) -> anyhow::Result<()>;

    /// Verify that `path` is a valid, linked working tree of the
    /// repository. Returns `Ok(true)` if healthy, `Ok(false)` if the
    /// working tree is damaged or missing (not a hard error).
    async fn integrity_check(&self, path: &Path) -> anyhow::Result<bool>;

    /// The repository's primary branch (e.g. `"main"`).
    fn primary_branch(&self) -> &str;
}
