//! Task executor capability: runs one request inside an acquired workspace.
//!
//! This is the adapter seam for "invoke external tooling, commit, open a
//! change-request" -- the core never knows what that tooling is. Stored as
//! `Arc<dyn TaskExecutor>` in the orchestrator and workers.

use std::path::Path;

use async_trait::async_trait;

use crate::request::Request;

/// Outcome of a single task executor invocation, before the worker turns
/// it into a [`crate::result::TaskResult`] (which also needs the
/// workspace id and timestamps the executor doesn't see).
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub passed: bool,
    pub tasks_passed: u32,
    pub tasks_failed: u32,
    /// Present only when `passed` is `false`.
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(tasks_passed: u32) -> Self {
        Self {
            passed: true,
            tasks_passed,
            tasks_failed: 0,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            passed: false,
            tasks_passed: 0,
            tasks_failed: 0,
            error: Some(error.into()),
        }
    }
}

/// Capability for running a request's work inside a workspace.
///
/// Implementors are responsible for any side effects inside `workspace_path`
/// (file mutations, local commits, remote change-requests gated by
/// `request.config.auto_merge`). The worker enforces `task_timeout`
/// externally via [`tokio::time::timeout`] around this call, so
/// implementations do not need to self-timeout -- only to respond
/// reasonably to being dropped mid-future.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, workspace_path: &Path, request: &Request) -> anyhow::Result<ExecutionOutcome>;
}

// Compile-time object-safety assertion for adapter traits stored as `dyn`.
const _: () = {
    fn _assert_object_safe(_: &dyn TaskExecutor) {}
};

/// Deterministic test double. Each call increments an internal counter;
/// behavior is driven by a closure so tests can express "always succeed
/// after 100ms", "raise on the third call", etc. without real I/O.
pub mod fake {
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{ExecutionOutcome, TaskExecutor};
    use crate::request::Request;

    pub struct FakeExecutor<F>
    where
        F: Fn(u32) -> anyhow::Result<ExecutionOutcome> + Send + Sync,
    {
        calls: AtomicU32,
        delay: Duration,
        behavior: F,
    }

    impl<F> FakeExecutor<F>
    where
        F: Fn(u32) -> anyhow::Result<ExecutionOutcome> + Send + Sync,
    {
        pub fn new(behavior: F) -> Self {
            Self {
                calls: AtomicU32::new(0),
                delay: Duration::from_millis(0),
                behavior,
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    /// Always succeeds after an optional simulated delay.
    pub fn always_succeeds(delay: Duration) -> FakeExecutor<impl Fn(u32) -> anyhow::Result<ExecutionOutcome> + Send + Sync> {
        FakeExecutor::new(|_call| Ok(ExecutionOutcome::success(1))).with_delay(delay)
    }

    /// Always raises an error, as if the executor itself failed.
    pub fn always_raises(message: impl Into<String> + Send + Sync + Clone + 'static) -> FakeExecutor<impl Fn(u32) -> anyhow::Result<ExecutionOutcome> + Send + Sync> {
        FakeExecutor::new(move |_call| anyhow::bail!(message.clone().into()))
    }

    #[async_trait]
    impl<F> TaskExecutor for FakeExecutor<F>
    where
        F: Fn(u32) -> anyhow::Result<ExecutionOutcome> + Send + Sync,
    {
        async fn execute(&self, _workspace_path: &Path, _request: &Request) -> anyhow::Result<ExecutionOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.behavior)(call)
        }
    }
}
