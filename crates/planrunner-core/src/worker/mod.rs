//! Execution worker: pairs one pending request with one workspace, drives
//! execution, classifies the outcome, and recycles resources in a loop
//! until stopped.

mod status;

pub use status::WorkerStatus;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::executor::TaskExecutor;
use crate::pool::WorkspacePool;
use crate::queue::RequestQueue;
use crate::request::{Request, RequestId};
use crate::result::TaskResult;

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Idle,
    RunningLoop,
    Stopping,
    Stopped,
}

/// Static configuration for a worker's iteration contract.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long `dequeue` is allowed to block before the worker re-checks
    /// its stop signal. The only polling interval in the core.
    pub dequeue_poll_interval: Duration,
    /// How long `pool.acquire` is allowed to block per request.
    pub worktree_acquire_timeout: Duration,
    /// How long `stop()` waits for the loop task to exit before
    /// abandoning it.
    pub worker_join_timeout: Duration,
    /// Leave a workspace BUSY (unreleased) after a failed execution
    /// instead of cleaning and recycling it, so it can be inspected.
    pub preserve_failed_workspaces: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            dequeue_poll_interval: Duration::from_secs(1),
            worktree_acquire_timeout: Duration::from_secs(30),
            worker_join_timeout: Duration::from_secs(10),
            preserve_failed_workspaces: false,
        }
    }
}

/// A long-lived loop that repeatedly dequeues a request, acquires a
/// workspace, executes the task, and releases the workspace.
pub struct ExecutionWorker {
    id: String,
    queue: Arc<RequestQueue>,
    pool: Arc<WorkspacePool>,
    executor: Arc<dyn TaskExecutor>,
    config: WorkerConfig,
    state: Mutex<WorkerState>,
    current_request: Mutex<Option<RequestId>>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionWorker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<RequestQueue>,
        pool: Arc<WorkspacePool>,
        executor: Arc<dyn TaskExecutor>,
        config: WorkerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            queue,
            pool,
            executor,
            config,
            state: Mutex::new(WorkerState::Idle),
            current_request: Mutex::new(None),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Start the worker loop in a background task. Double-start is a
    /// no-op with a warning.
    pub async fn start(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if *state != WorkerState::Idle {
            tracing::warn!(worker_id = %self.id, "start() called on a worker that is not idle");
            return;
        }
        *state = WorkerState::RunningLoop;
        drop(state);

        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move { worker.run_loop().await });
        *self.handle.lock().await = Some(handle);
        tracing::info!(worker_id = %self.id, "worker started");
    }

    /// Signal the loop to stop, and wait for it to exit (bounded by
    /// `worker_join_timeout`). Double-stop is a no-op with a warning.
    pub async fn stop(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().await;
            if *state != WorkerState::RunningLoop {
                tracing::warn!(worker_id = %self.id, "stop() called on a worker that is not running");
                return;
            }
            *state = WorkerState::Stopping;
        }

        self.cancel.cancel();

        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if tokio::time::timeout(self.config.worker_join_timeout, handle).await.is_err() {
                tracing::warn!(
                    worker_id = %self.id,
                    timeout = ?self.config.worker_join_timeout,
                    "worker join timed out, abandoning loop task"
                );
            }
        }

        *self.state.lock().await = WorkerState::Stopped;
        tracing::info!(worker_id = %self.id, "worker stopped");
    }

    async fn run_loop(self: Arc<Self>) {
        tracing::info!(worker_id = %self.id, "worker loop entering");
        loop {
            // Select on (dequeue, stop) rather than a fixed polling
            // interval, so cancellation is observed as soon as it's
            // signaled instead of only between poll windows.
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                dequeued = tokio::time::timeout(self.config.dequeue_poll_interval, self.queue.dequeue()) => {
                    match dequeued {
                        Err(_elapsed) => continue,
                        Ok(None) => break, // queue closed and drained
                        Ok(Some(req)) => self.process(req).await,
                    }
                }
            }
        }
        *self.state.lock().await = WorkerState::Stopped;
        tracing::info!(worker_id = %self.id, "worker loop exiting");
    }

    /// One full iteration of the contract: mark running, acquire a
    /// workspace, execute with a timeout, classify, release.
    async fn process(&self, req: Request) {
        let request_id = req.id;
        *self.current_request.lock().await = Some(request_id);

        if let Err(e) = self.queue.mark_running(req.clone()).await {
            tracing::error!(worker_id = %self.id, request_id = %request_id, error = %e, "mark_running failed, dropping request");
            *self.current_request.lock().await = None;
            return;
        }

        let started_at = Utc::now();
        let acquired = self.pool.acquire(Some(request_id), self.config.worktree_acquire_timeout).await;

        let result = match acquired {
            Err(e) => TaskResult::failed(
                request_id,
                None,
                format!("workspace acquisition failed: {e}"),
                started_at,
                Utc::now(),
            ),
            Ok(workspace_id) => {
                tracing::info!(worker_id = %self.id, request_id = %request_id, workspace_id = %workspace_id, "acquired workspace");
                let result = self.execute(&req, &workspace_id, started_at).await;

                let preserve = self.config.preserve_failed_workspaces
                    && result.status == crate::result::TerminalStatus::Failed;
                if preserve {
                    tracing::info!(worker_id = %self.id, workspace_id = %workspace_id, "preserving failed workspace, skipping release");
                } else if let Err(e) = self.pool.release(&workspace_id).await {
                    tracing::warn!(worker_id = %self.id, workspace_id = %workspace_id, error = %e, "release failed (workspace marked ERROR)");
                }
                result
            }
        };

        self.handle_outcome(req, result).await;
        *self.current_request.lock().await = None;
    }

    async fn execute(
        &self,
        req: &Request,
        workspace_id: &crate::pool::WorkspaceId,
        started_at: chrono::DateTime<Utc>,
    ) -> TaskResult {
        let workspace_path = match self.pool.path_of(workspace_id).await {
            Some(path) => path,
            None => {
                return TaskResult::failed(
                    req.id,
                    Some(workspace_id.clone()),
                    format!("workspace {workspace_id} vanished from pool before execution"),
                    started_at,
                    Utc::now(),
                );
            }
        };
        let outcome = tokio::time::timeout(req.config.task_timeout, self.executor.execute(&workspace_path, req)).await;

        match outcome {
            Err(_elapsed) => TaskResult::failed(
                req.id,
                Some(workspace_id.clone()),
                format!("task timed out after {:?}", req.config.task_timeout),
                started_at,
                Utc::now(),
            ),
            Ok(Err(e)) => TaskResult::failed(
                req.id,
                Some(workspace_id.clone()),
                format!("Worker error: {e}"),
                started_at,
                Utc::now(),
            ),
            Ok(Ok(outcome)) if outcome.passed => TaskResult::complete(
                req.id,
                workspace_id.clone(),
                outcome.tasks_passed,
                outcome.tasks_failed,
                started_at,
                Utc::now(),
            ),
            Ok(Ok(outcome)) => TaskResult::failed(
                req.id,
                Some(workspace_id.clone()),
                outcome.error.unwrap_or_else(|| "task reported failure".to_string()),
                started_at,
                Utc::now(),
            ),
        }
    }

    async fn handle_outcome(&self, req: Request, result: TaskResult) {
        match result.status {
            crate::result::TerminalStatus::Complete => {
                tracing::info!(worker_id = %self.id, request_id = %req.id, "request completed");
                self.queue.mark_complete(req.id, result).await;
            }
            crate::result::TerminalStatus::Failed => {
                let id = req.id;
                if self.queue.requeue_for_retry(req).await {
                    tracing::info!(worker_id = %self.id, request_id = %id, "request failed, requeued for retry");
                } else {
                    tracing::warn!(worker_id = %self.id, request_id = %id, "request failed, retries exhausted");
                    self.queue.mark_failed(id, result).await;
                }
            }
        }
    }

    pub async fn get_status(&self) -> WorkerStatus {
        let state = *self.state.lock().await;
        WorkerStatus {
            id: self.id.clone(),
            running: state == WorkerState::RunningLoop,
            current_request: *self.current_request.lock().await,
            dequeue_poll_interval: self.config.dequeue_poll_interval,
            worktree_acquire_timeout: self.config.worktree_acquire_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::fake::{always_raises, always_succeeds};
    use crate::pool::PoolConfig;
    use crate::request::RequestConfig;
    use crate::vcs::FakeVcs;
    use std::path::PathBuf;

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            dequeue_poll_interval: Duration::from_millis(20),
            worktree_acquire_timeout: Duration::from_millis(200),
            worker_join_timeout: Duration::from_secs(1),
            preserve_failed_workspaces: false,
        }
    }

    async fn test_pool() -> Arc<WorkspacePool> {
        let pool = Arc::new(WorkspacePool::new(
            PoolConfig {
                base_dir: PathBuf::from("/tmp/planrunner-worker-test"),
                ..PoolConfig::default()
            },
            Arc::new(FakeVcs::new("main")),
        ));
        pool.initialize(1).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn successful_request_marks_complete() {
        let queue = Arc::new(RequestQueue::new(4));
        let pool = test_pool().await;
        let executor = Arc::new(always_succeeds(Duration::ZERO));
        let worker = ExecutionWorker::new("w1", Arc::clone(&queue), Arc::clone(&pool), executor, test_config());

        let req = Request::new("plans/a.yaml", RequestConfig::default());
        let id = req.id;
        queue.enqueue(req).await.unwrap();

        worker.start().await;
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if queue.get_status().await.completed_count == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("request should complete");
        worker.stop().await;

        let completed = queue.completed_results().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].request_id, id);

        let status = pool.get_status().await;
        assert_eq!(status.num_free, 1, "workspace should be released back to the pool");
    }

    #[tokio::test]
    async fn failing_request_exhausts_retries_then_fails() {
        let queue = Arc::new(RequestQueue::new(4));
        let pool = test_pool().await;
        let executor = Arc::new(always_raises("boom"));
        let worker = ExecutionWorker::new("w1", Arc::clone(&queue), Arc::clone(&pool), executor, test_config());

        let mut config = RequestConfig::default();
        config.max_retries = 2;
        let req = Request::new("plans/a.yaml", config);
        queue.enqueue(req).await.unwrap();

        worker.start().await;
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if queue.get_status().await.failed_count == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("request should eventually fail");
        worker.stop().await;

        let failed = queue.failed_results().await;
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error.is_some());
    }

    #[tokio::test]
    async fn acquisition_timeout_fails_request_without_blocking_forever() {
        let queue = Arc::new(RequestQueue::new(4));
        let pool = test_pool().await;
        // Exhaust the single workspace up front.
        let held = pool.acquire(None, Duration::from_secs(1)).await.unwrap();

        let executor = Arc::new(always_succeeds(Duration::ZERO));
        let worker = ExecutionWorker::new("w1", Arc::clone(&queue), Arc::clone(&pool), executor, test_config());

        let req = Request::new("plans/a.yaml", RequestConfig::default());
        queue.enqueue(req).await.unwrap();

        worker.start().await;
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if queue.get_status().await.failed_count == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("request should fail after acquisition timeout");
        worker.stop().await;

        pool.release(&held).await.unwrap();
    }

    #[tokio::test]
    async fn stop_before_any_request_is_safe() {
        let queue = Arc::new(RequestQueue::new(4));
        let pool = test_pool().await;
        let executor = Arc::new(always_succeeds(Duration::ZERO));
        let worker = ExecutionWorker::new("w1", queue, pool, executor, test_config());

        worker.start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        worker.stop().await;

        let status = worker.get_status().await;
        assert!(!status.running);
    }
}
