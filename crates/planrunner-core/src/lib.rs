//! Parallel test-plan execution engine: a bounded request queue, a pool of
//! isolated git worktrees, a fleet of execution workers, and an
//! orchestrator wiring them together.
//!
//! This crate owns scheduling and concurrency only. Plan parsing, task
//! execution, HTTP, and persistence are external collaborators, reached
//! through the [`vcs::Vcs`] and [`executor::TaskExecutor`] capability
//! traits.

pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod pool;
pub mod queue;
pub mod report;
pub mod request;
pub mod result;
pub mod vcs;
pub mod worker;

pub use error::{OrchestratorError, PoolError, QueueError};
pub use executor::{ExecutionOutcome, TaskExecutor};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorStatus};
pub use pool::{PoolConfig, WorkspaceId, WorkspacePool};
pub use queue::RequestQueue;
pub use report::{ReportStatus, SessionReport};
pub use request::{Request, RequestConfig, RequestId};
pub use result::{TaskResult, TerminalStatus};
pub use vcs::{GitVcs, Vcs};
pub use worker::{ExecutionWorker, WorkerConfig};
