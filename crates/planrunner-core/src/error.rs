//! Error taxonomy for the scheduling runtime.
//!
//! Each kind below corresponds to a failure mode a caller can reasonably
//! branch on (retry, surface to the user, or treat as fatal). Transient,
//! per-request failures are converted into [`crate::result::TaskResult`]
//! values by the worker rather than propagated as errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::pool::WorkspaceId;

/// Errors surfaced by [`crate::pool::WorkspacePool`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// `acquire`/`release`/`health_check` called before `initialize`.
    #[error("workspace pool has not been initialized")]
    NotInitialized,

    /// `initialize` called twice without an intervening `cleanup`.
    #[error("workspace pool is already initialized")]
    AlreadyInitialized,

    /// No workspace became free within the requested budget.
    #[error("timed out after {waited:?} waiting for a free workspace")]
    AcquisitionTimeout { waited: Duration },

    /// Creating a workspace failed or exceeded its timeout.
    #[error("failed to create workspace {id}: {source}")]
    WorkspaceCreation {
        id: WorkspaceId,
        #[source]
        source: anyhow::Error,
    },

    /// Cleaning a workspace after release failed or exceeded its timeout.
    #[error("failed to clean workspace {id}: {source}")]
    WorkspaceCleanup {
        id: WorkspaceId,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors surfaced by [`crate::queue::RequestQueue`].
#[derive(Debug, Error)]
pub enum QueueError {
    /// `enqueue`/`enqueue_batch` called after `close`.
    #[error("request queue is closed")]
    Closed,

    /// `mark_running` called for a request that is already tracked.
    #[error("request {0} is already tracked (running or terminal)")]
    AlreadyTracked(uuid::Uuid),
}

/// Errors surfaced by [`crate::orchestrator::Orchestrator`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("orchestrator has not been initialized")]
    NotInitialized,

    #[error("orchestrator is not running")]
    NotRunning,

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("main repository path does not exist: {0}")]
    InvalidRepoPath(PathBuf),
}
