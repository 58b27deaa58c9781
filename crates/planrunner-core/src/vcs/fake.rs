//! Deterministic in-memory [`super::Vcs`] double for tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::Vcs;

/// Configurable failure injection for [`FakeVcs`].
#[derive(Debug, Default, Clone)]
pub struct FakeVcsFaults {
    /// Paths that should fail `add_worktree`.
    pub fail_create: HashSet<PathBuf>,
    /// Paths that should fail any of the cleaning steps.
    pub fail_clean: HashSet<PathBuf>,
}

struct State {
    worktrees: HashSet<PathBuf>,
    /// Local branches, tracked per worktree path (branch deletion in one
    /// worktree must never affect another's).
    branches: HashMap<PathBuf, HashSet<String>>,
    faults: FakeVcsFaults,
}

/// In-memory stand-in for a real repository. Tracks which paths have a
/// "worktree" and which branch names exist, without touching the
/// filesystem or spawning a process.
pub struct FakeVcs {
    primary_branch: String,
    state: Mutex<State>,
}

impl FakeVcs {
    pub fn new(primary_branch: impl Into<String>) -> Self {
        Self {
            primary_branch: primary_branch.into(),
            state: Mutex::new(State {
                worktrees: HashSet::new(),
                branches: HashMap::new(),
                faults: FakeVcsFaults::default(),
            }),
        }
    }

    pub fn with_faults(self, faults: FakeVcsFaults) -> Self {
        self.state.lock().unwrap().faults = faults;
        self
    }

    pub fn inject_clean_failure(&self, path: &Path) {
        self.state.lock().unwrap().faults.fail_clean.insert(path.to_path_buf());
    }

    pub fn clear_clean_failure(&self, path: &Path) {
        self.state.lock().unwrap().faults.fail_clean.remove(path);
    }

    pub fn worktree_count(&self) -> usize {
        self.state.lock().unwrap().worktrees.len()
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn add_worktree(&self, path: &Path, branch: &str, _from_ref: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.faults.fail_create.contains(path) {
            bail!("simulated worktree creation failure for {}", path.display());
        }
        state.worktrees.insert(path.to_path_buf());
        state.branches.entry(path.to_path_buf()).or_default().insert(branch.to_string());
        Ok(())
    }

    async fn remove_worktree(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.worktrees.remove(path);
        state.branches.remove(path);
        Ok(())
    }

    async fn list_branches(&self, path: &Path) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut branches: Vec<String> = state.branches.get(path).cloned().unwrap_or_default().into_iter().collect();
        branches.sort();
        Ok(branches)
    }

    async fn delete_branch(&self, path: &Path, branch: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(branches) = state.branches.get_mut(path) {
            branches.remove(branch);
        }
        Ok(())
    }

    async fn checkout_force(&self, path: &Path, _branch: &str) -> Result<()> {
        let state = self.state.lock().unwrap();
        if state.faults.fail_clean.contains(path) {
            bail!("simulated checkout failure for {}", path.display());
        }
        Ok(())
    }

    async fn hard_reset(&self, path: &Path, _to_ref: &str) -> Result<()> {
        let state = self.state.lock().unwrap();
        if state.faults.fail_clean.contains(path) {
            bail!("simulated reset failure for {}", path.display());
        }
        Ok(())
    }

    async fn clean(&self, path: &Path) -> Result<()> {
        let state = self.state.lock().unwrap();
        if state.faults.fail_clean.contains(path) {
            bail!("simulated clean failure for {}", path.display());
        }
        Ok(())
    }

    async fn integrity_check(&self, path: &Path) -> Result<bool> {
        Ok(self.state.lock().unwrap().worktrees.contains(path))
    }

    fn primary_branch(&self) -> &str {
        &self.primary_branch
    }
}
