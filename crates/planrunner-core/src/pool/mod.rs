//! Workspace pool: exclusive, bounded-cardinality leases over isolated
//! working copies of a single repository.
//!
//! All table mutations are serialized by a single [`tokio::sync::Mutex`].
//! The mutex is never held across an external VCS command -- state is
//! transitioned, the lock is dropped, the command runs, and the lock is
//! re-acquired to finalize. Waiters on [`WorkspacePool::acquire`] are woken
//! in FIFO order via a queue of one-shot channels rather than a polling
//! loop (see module docs in `queue/mod.rs` for the matching pattern used
//! by the request queue).

mod status;

pub use status::{PoolStatus, WorkspaceStatus};

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use crate::error::PoolError;
use crate::request::RequestId;
use crate::vcs::Vcs;

/// Stable identifier for a workspace (e.g. `wt-1`), unique within a pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    pub(crate) fn new(index: usize) -> Self {
        Self(format!("wt-{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a single workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkspaceState {
    Free,
    Busy,
    Error,
}

/// Everything the pool tracks about one workspace.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceDescriptor {
    pub id: WorkspaceId,
    pub path: PathBuf,
    pub branch: String,
    pub state: WorkspaceState,
    pub current_request: Option<RequestId>,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

/// Static configuration for a [`WorkspacePool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub base_dir: PathBuf,
    /// Per-step timeout for workspace creation.
    pub create_timeout: Duration,
    /// Per-step timeout for each step of the cleaning protocol.
    pub clean_step_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./worktrees"),
            create_timeout: Duration::from_secs(60),
            clean_step_timeout: Duration::from_secs(30),
        }
    }
}

struct Waiter {
    id: Uuid,
    tx: oneshot::Sender<WorkspaceId>,
}

struct PoolState {
    workspaces: HashMap<WorkspaceId, WorkspaceDescriptor>,
    free: VecDeque<WorkspaceId>,
    waiters: VecDeque<Waiter>,
    initialized: bool,
}

impl PoolState {
    fn new() -> Self {
        Self {
            workspaces: HashMap::new(),
            free: VecDeque::new(),
            waiters: VecDeque::new(),
            initialized: false,
        }
    }
}

/// Owns a fixed number of isolated working copies and hands out exclusive
/// leases over them.
pub struct WorkspacePool {
    config: PoolConfig,
    vcs: Arc<dyn Vcs>,
    state: Mutex<PoolState>,
}

impl WorkspacePool {
    pub fn new(config: PoolConfig, vcs: Arc<dyn Vcs>) -> Self {
        Self {
            config,
            vcs,
            state: Mutex::new(PoolState::new()),
        }
    }

    /// Materialize `count` workspaces. Not re-entrant: calling this twice
    /// without an intervening [`Self::cleanup`] is a usage error.
    ///
    /// Any pre-existing workspace at a candidate id is destroyed first.
    /// On any creation failure the pool is left partially initialized
    /// (workspaces created so far remain usable) and the error is
    /// returned to the caller.
    pub async fn initialize(&self, count: usize) -> Result<(), PoolError> {
        {
            let state = self.state.lock().await;
            if state.initialized {
                return Err(PoolError::AlreadyInitialized);
            }
        }

        for i in 1..=count {
            let id = WorkspaceId::new(i);
            let path = self.config.base_dir.join(id.as_str());
            let branch = format!("worktree-{id}");

            // Destroy any pre-existing workspace at this id first.
            let _ = self.vcs.remove_worktree(&path).await;
            let _ = self.vcs.delete_branch(&path, &branch).await;

            let create = self.vcs.add_worktree(&path, &branch, self.vcs.primary_branch());
            let created = match tokio::time::timeout(self.config.create_timeout, create).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    return Err(PoolError::WorkspaceCreation { id, source: e });
                }
                Err(_) => {
                    return Err(PoolError::WorkspaceCreation {
                        id,
                        source: anyhow::anyhow!(
                            "timed out after {:?} creating workspace",
                            self.config.create_timeout
                        ),
                    });
                }
            };
            debug_assert!(created);

            let descriptor = WorkspaceDescriptor {
                id: id.clone(),
                path,
                branch,
                state: WorkspaceState::Free,
                current_request: None,
                created_at: Utc::now(),
                last_used: None,
            };

            let mut state = self.state.lock().await;
            state.free.push_back(id.clone());
            state.workspaces.insert(id, descriptor);
        }

        let mut state = self.state.lock().await;
        state.initialized = true;
        tracing::info!(count = count, "workspace pool initialized");
        Ok(())
    }

    fn is_initialized_sync(state: &PoolState) -> bool {
        state.initialized
    }

    /// Acquire a free workspace, blocking until one is available or
    /// `timeout` elapses. Waiters are served strictly in FIFO order.
    pub async fn acquire(
        &self,
        tag: Option<RequestId>,
        timeout: Duration,
    ) -> Result<WorkspaceId, PoolError> {
        // Fast path: a workspace is already free.
        {
            let mut state = self.state.lock().await;
            if !Self::is_initialized_sync(&state) {
                return Err(PoolError::NotInitialized);
            }
            if let Some(id) = state.free.pop_front() {
                if let Some(desc) = state.workspaces.get_mut(&id) {
                    desc.state = WorkspaceState::Busy;
                    desc.current_request = tag;
                    desc.last_used = Some(Utc::now());
                }
                return Ok(id);
            }
        }

        // Slow path: register as a FIFO waiter and block.
        let (tx, rx) = oneshot::channel();
        let waiter_id = Uuid::new_v4();
        {
            let mut state = self.state.lock().await;
            state.waiters.push_back(Waiter { id: waiter_id, tx });
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(id)) => {
                let mut state = self.state.lock().await;
                if let Some(desc) = state.workspaces.get_mut(&id) {
                    desc.current_request = tag;
                    desc.last_used = Some(Utc::now());
                }
                Ok(id)
            }
            Ok(Err(_)) => Err(PoolError::AcquisitionTimeout { waited: timeout }),
            Err(_) => {
                let mut state = self.state.lock().await;
                let removed = remove_waiter(&mut state.waiters, waiter_id);
                if removed.is_some() {
                    return Err(PoolError::AcquisitionTimeout { waited: timeout });
                }
                // The waiter was already popped by a concurrent release
                // racing our timeout; the value may still be in the
                // channel.
                drop(state);
                match rx.try_recv() {
                    Ok(id) => {
                        let mut state = self.state.lock().await;
                        if let Some(desc) = state.workspaces.get_mut(&id) {
                            desc.current_request = tag;
                            desc.last_used = Some(Utc::now());
                        }
                        Ok(id)
                    }
                    Err(_) => Err(PoolError::AcquisitionTimeout { waited: timeout }),
                }
            }
        }
    }

    /// Release a workspace: clean it, then transition BUSY -> FREE (or
    /// BUSY -> ERROR on a cleaning failure). Releasing an id the pool
    /// doesn't recognize is a no-op with a warning.
    pub async fn release(&self, id: &WorkspaceId) -> Result<(), PoolError> {
        let (path, branch) = {
            let state = self.state.lock().await;
            match state.workspaces.get(id) {
                Some(desc) => (desc.path.clone(), desc.branch.clone()),
                None => {
                    tracing::warn!(workspace_id = %id, "release of unknown workspace id");
                    return Ok(());
                }
            }
        };

        let clean_result = self.clean_workspace(&path, &branch).await;

        let mut state = self.state.lock().await;
        match clean_result {
            Ok(()) => {
                if let Some(desc) = state.workspaces.get_mut(id) {
                    desc.current_request = None;
                    // Hand off directly to the longest-waiting acquirer
                    // if one exists; otherwise return it to the free list.
                    if let Some(waiter) = state.waiters.pop_front() {
                        desc.state = WorkspaceState::Busy;
                        let _ = waiter.tx.send(id.clone());
                    } else {
                        desc.state = WorkspaceState::Free;
                        state.free.push_back(id.clone());
                    }
                }
                Ok(())
            }
            Err(e) => {
                if let Some(desc) = state.workspaces.get_mut(id) {
                    desc.state = WorkspaceState::Error;
                    desc.current_request = None;
                }
                Err(PoolError::WorkspaceCleanup {
                    id: id.clone(),
                    source: e,
                })
            }
        }
    }

    /// The four-step cleaning protocol, each step bounded by
    /// `clean_step_timeout`. Stops at the first failing step.
    async fn clean_workspace(&self, path: &PathBuf, branch: &str) -> anyhow::Result<()> {
        let timeout = self.config.clean_step_timeout;
        let primary = self.vcs.primary_branch().to_string();

        self.bounded(timeout, self.vcs.checkout_force(path, &primary)).await?;
        self.bounded(timeout, self.vcs.hard_reset(path, &format!("origin/{primary}"))).await?;
        self.bounded(timeout, self.vcs.clean(path)).await?;

        let branches = self.bounded(timeout, self.vcs.list_branches(path)).await?;
        for b in branches {
            if b != primary && b != branch {
                self.bounded(timeout, self.vcs.delete_branch(path, &b)).await?;
            }
        }
        Ok(())
    }

    async fn bounded<T>(&self, timeout: Duration, fut: impl std::future::Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
        match tokio::time::timeout(timeout, fut).await {
            Ok(inner) => inner,
            Err(_) => anyhow::bail!("vcs operation timed out after {:?}", timeout),
        }
    }

    /// Verify each workspace is a healthy, linked working copy; attempt to
    /// recover `ERROR` entries. Returns a map of workspace id to the
    /// issues found (empty vec if healthy).
    pub async fn health_check(&self) -> HashMap<WorkspaceId, Vec<String>> {
        let ids: Vec<WorkspaceId> = {
            let state = self.state.lock().await;
            state.workspaces.keys().cloned().collect()
        };

        let mut issues = HashMap::new();
        for id in ids {
            let (path, was_error) = {
                let state = self.state.lock().await;
                let desc = match state.workspaces.get(&id) {
                    Some(d) => d,
                    None => continue,
                };
                (desc.path.clone(), desc.state == WorkspaceState::Error)
            };

            let healthy = self.vcs.integrity_check(&path).await.unwrap_or(false);
            let mut problems = Vec::new();
            if !healthy {
                problems.push(format!("workspace {id} failed integrity check"));
            } else if was_error {
                let mut state = self.state.lock().await;
                if let Some(waiter) = state.waiters.pop_front() {
                    if let Some(desc) = state.workspaces.get_mut(&id) {
                        desc.state = WorkspaceState::Busy;
                    }
                    let _ = waiter.tx.send(id.clone());
                } else {
                    if let Some(desc) = state.workspaces.get_mut(&id) {
                        desc.state = WorkspaceState::Free;
                    }
                    state.free.push_back(id.clone());
                }
                tracing::info!(workspace_id = %id, "recovered workspace from ERROR state");
            }
            issues.insert(id, problems);
        }
        issues
    }

    /// Remove every workspace (best-effort), clear the table, and mark the
    /// pool uninitialized. Individual failures are logged but do not
    /// abort the sweep.
    pub async fn cleanup(&self) {
        let entries: Vec<WorkspaceDescriptor> = {
            let state = self.state.lock().await;
            state.workspaces.values().cloned().collect()
        };

        for desc in &entries {
            if let Err(e) = self.vcs.remove_worktree(&desc.path).await {
                tracing::error!(workspace_id = %desc.id, error = %e, "failed to remove workspace during cleanup");
            }
            if let Err(e) = self.vcs.delete_branch(&desc.path, &desc.branch).await {
                tracing::error!(workspace_id = %desc.id, error = %e, "failed to delete branch during cleanup");
            }
        }

        let mut state = self.state.lock().await;
        state.workspaces.clear();
        state.free.clear();
        state.waiters.clear();
        state.initialized = false;
        tracing::info!("workspace pool cleanup complete");
    }

    /// Snapshot of pool status: per-workspace state plus aggregate counts.
    pub async fn get_status(&self) -> PoolStatus {
        let state = self.state.lock().await;
        PoolStatus::from_descriptors(state.workspaces.values())
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.initialized
    }

    /// Filesystem path of a tracked workspace, or `None` if `id` is
    /// unknown to this pool.
    pub async fn path_of(&self, id: &WorkspaceId) -> Option<PathBuf> {
        self.state.lock().await.workspaces.get(id).map(|d| d.path.clone())
    }
}

fn remove_waiter(waiters: &mut VecDeque<Waiter>, id: Uuid) -> Option<Waiter> {
    let pos = waiters.iter().position(|w| w.id == id)?;
    waiters.remove(pos)
}
