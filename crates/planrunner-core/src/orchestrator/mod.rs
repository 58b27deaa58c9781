//! Orchestrator: wires a workspace pool, a request queue, and a pool of
//! execution workers into one session, and produces a final report.

mod status;

pub use status::OrchestratorStatus;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::executor::TaskExecutor;
use crate::pool::{PoolConfig, WorkspacePool};
use crate::queue::RequestQueue;
use crate::report::SessionReport;
use crate::request::{Request, RequestConfig, RequestId};
use crate::vcs::Vcs;
use crate::worker::{ExecutionWorker, WorkerConfig};

/// Lifecycle state of an [`Orchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrchestratorState {
    Created,
    Initialized,
    Running,
    Draining,
    Stopped,
}

/// Static configuration for one orchestrator session.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub worker_count: usize,
    pub base_dir: PathBuf,
    pub max_queue_size: usize,
    pub default_max_retries: u32,
    pub default_task_timeout: Duration,
    pub worktree_acquire_timeout: Duration,
    pub worker_join_timeout: Duration,
    /// Tear the workspace pool down once the session drains.
    pub cleanup_on_completion: bool,
    /// Skip the pool's usual release-clean protocol for workspaces that
    /// produced a failed result, so they can be inspected afterwards.
    pub preserve_failed_workspaces: bool,
    /// Upper bound on how long [`Orchestrator::wait_for_completion`] blocks
    /// before giving up on a clean drain.
    pub queue_drain_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            base_dir: PathBuf::from("./worktrees"),
            max_queue_size: 100,
            default_max_retries: 0,
            default_task_timeout: Duration::from_secs(300),
            worktree_acquire_timeout: Duration::from_secs(30),
            worker_join_timeout: Duration::from_secs(10),
            cleanup_on_completion: true,
            preserve_failed_workspaces: false,
            queue_drain_timeout: Duration::from_secs(3600),
        }
    }
}

/// Drives a bounded-concurrency execution session: owns the pool, the
/// queue, and the worker fleet, and produces a [`SessionReport`] once the
/// queue drains.
pub struct Orchestrator {
    session_id: Uuid,
    config: OrchestratorConfig,
    pool: Arc<WorkspacePool>,
    queue: Arc<RequestQueue>,
    executor: Arc<dyn TaskExecutor>,
    workers: Mutex<Vec<Arc<ExecutionWorker>>>,
    state: Mutex<OrchestratorState>,
    started_at: Mutex<Option<chrono::DateTime<Utc>>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, vcs: Arc<dyn Vcs>, executor: Arc<dyn TaskExecutor>) -> Self {
        let queue = Arc::new(RequestQueue::new(config.max_queue_size));
        let pool_config = PoolConfig {
            base_dir: config.base_dir.clone(),
            ..PoolConfig::default()
        };
        let pool = Arc::new(WorkspacePool::new(pool_config, vcs));

        Self {
            session_id: Uuid::new_v4(),
            config,
            pool,
            queue,
            executor,
            workers: Mutex::new(Vec::new()),
            state: Mutex::new(OrchestratorState::Created),
            started_at: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Materialize the workspace pool and the worker fleet. Must be called
    /// exactly once before [`Self::start`].
    pub async fn initialize(&self) -> Result<(), OrchestratorError> {
        {
            let state = self.state.lock().await;
            if *state != OrchestratorState::Created {
                return Err(OrchestratorError::NotInitialized);
            }
        }

        self.pool.initialize(self.config.worker_count).await?;

        let worker_config = WorkerConfig {
            worktree_acquire_timeout: self.config.worktree_acquire_timeout,
            worker_join_timeout: self.config.worker_join_timeout,
            preserve_failed_workspaces: self.config.preserve_failed_workspaces,
            ..WorkerConfig::default()
        };

        let mut workers = self.workers.lock().await;
        for i in 1..=self.config.worker_count {
            workers.push(ExecutionWorker::new(
                format!("worker-{i}"),
                Arc::clone(&self.queue),
                Arc::clone(&self.pool),
                Arc::clone(&self.executor),
                worker_config.clone(),
            ));
        }

        *self.state.lock().await = OrchestratorState::Initialized;
        tracing::info!(session_id = %self.session_id, workers = self.config.worker_count, "orchestrator initialized");
        Ok(())
    }

    /// Start every worker. Requires a prior [`Self::initialize`].
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        {
            let mut state = self.state.lock().await;
            if *state != OrchestratorState::Initialized {
                return Err(OrchestratorError::NotInitialized);
            }
            *state = OrchestratorState::Running;
        }

        *self.started_at.lock().await = Some(Utc::now());

        let workers = self.workers.lock().await;
        for worker in workers.iter() {
            worker.start().await;
        }
        tracing::info!(session_id = %self.session_id, "orchestrator running");
        Ok(())
    }

    /// Submit one request. Blocks under back-pressure if the queue is at
    /// capacity.
    pub async fn submit(&self, mut req: Request) -> Result<RequestId, OrchestratorError> {
        if *self.state.lock().await != OrchestratorState::Running {
            return Err(OrchestratorError::NotRunning);
        }
        self.apply_config_defaults(&mut req);
        let id = req.id;
        self.queue.enqueue(req).await?;
        Ok(id)
    }

    /// Submit a batch of requests in order.
    pub async fn submit_batch(&self, mut reqs: Vec<Request>) -> Result<Vec<RequestId>, OrchestratorError> {
        if *self.state.lock().await != OrchestratorState::Running {
            return Err(OrchestratorError::NotRunning);
        }
        for req in &mut reqs {
            self.apply_config_defaults(req);
        }
        let ids = reqs.iter().map(|r| r.id).collect();
        self.queue.enqueue_batch(reqs).await?;
        Ok(ids)
    }

    /// Fill in `max_retries`/`task_timeout` from this session's configured
    /// defaults for any request that left them at `RequestConfig::default()`,
    /// i.e. didn't specify one.
    fn apply_config_defaults(&self, req: &mut Request) {
        let unset = RequestConfig::default();
        if req.config.max_retries == unset.max_retries {
            req.config.max_retries = self.config.default_max_retries;
        }
        if req.config.task_timeout == unset.task_timeout {
            req.config.task_timeout = self.config.default_task_timeout;
        }
    }

    /// Close the queue to new submissions and block until every pending
    /// and running request has reached a terminal state, bounded by
    /// `queue_drain_timeout`. Returns the final report regardless of
    /// whether the bound was hit.
    pub async fn wait_for_completion(&self) -> Result<SessionReport, OrchestratorError> {
        {
            let mut state = self.state.lock().await;
            if *state == OrchestratorState::Created || *state == OrchestratorState::Initialized {
                return Err(OrchestratorError::NotRunning);
            }
            *state = OrchestratorState::Draining;
        }

        self.queue.close().await;

        if tokio::time::timeout(self.config.queue_drain_timeout, self.queue.wait_until_empty())
            .await
            .is_err()
        {
            tracing::warn!(
                session_id = %self.session_id,
                timeout = ?self.config.queue_drain_timeout,
                "queue did not drain within the configured timeout"
            );
        }

        self.build_report().await
    }

    /// Stop all workers and, if configured, tear down the workspace pool.
    /// Safe to call after [`Self::wait_for_completion`] or to force an
    /// early stop.
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        self.queue.close().await;

        let workers = self.workers.lock().await;
        for worker in workers.iter() {
            worker.stop().await;
        }
        drop(workers);

        let had_failures = self.queue.get_status().await.failed_count > 0;
        let should_cleanup = self.config.cleanup_on_completion
            && (!had_failures || !self.config.preserve_failed_workspaces);
        if should_cleanup {
            self.pool.cleanup().await;
        }

        *self.state.lock().await = OrchestratorState::Stopped;
        tracing::info!(session_id = %self.session_id, "orchestrator shut down");
        Ok(())
    }

    /// Convenience end-to-end run: initialize, start, submit `reqs`, wait
    /// for completion, shut down, and return the report.
    pub async fn run(&self, reqs: Vec<Request>) -> Result<SessionReport, OrchestratorError> {
        self.initialize().await?;
        self.start().await?;
        self.submit_batch(reqs).await?;
        let report = self.wait_for_completion().await?;
        self.shutdown().await?;
        Ok(report)
    }

    async fn build_report(&self) -> Result<SessionReport, OrchestratorError> {
        let summary = self.queue.get_results_summary().await;
        let completed = self.queue.completed_results().await;
        let failed = self.queue.failed_results().await;
        let started_at = self.started_at.lock().await.unwrap_or_else(Utc::now);
        let worker_count = self.workers.lock().await.len();
        Ok(SessionReport::new(
            self.session_id,
            started_at,
            Utc::now(),
            summary,
            completed,
            failed,
            worker_count,
        ))
    }

    pub async fn get_status(&self) -> OrchestratorStatus {
        let pool_status = self.pool.get_status().await;
        let queue_status = self.queue.get_status().await;
        let workers = self.workers.lock().await;
        let mut worker_statuses = Vec::with_capacity(workers.len());
        for worker in workers.iter() {
            worker_statuses.push(worker.get_status().await);
        }
        let state = *self.state.lock().await;
        OrchestratorStatus {
            session_id: self.session_id,
            initialized: state != OrchestratorState::Created,
            running: state == OrchestratorState::Running,
            started_at: *self.started_at.lock().await,
            pool: pool_status,
            queue: queue_status,
            workers: worker_statuses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::fake::{always_raises, always_succeeds};
    use crate::report::ReportStatus;
    use crate::request::RequestConfig;
    use crate::vcs::FakeVcs;

    fn test_config(worker_count: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            worker_count,
            base_dir: PathBuf::from("/tmp/planrunner-orchestrator-test"),
            max_queue_size: 16,
            worktree_acquire_timeout: Duration::from_millis(500),
            worker_join_timeout: Duration::from_secs(1),
            queue_drain_timeout: Duration::from_secs(5),
            ..OrchestratorConfig::default()
        }
    }

    fn requests(n: usize) -> Vec<Request> {
        (0..n).map(|i| Request::new(format!("plans/{i}.yaml"), RequestConfig::default())).collect()
    }

    #[tokio::test]
    async fn happy_path_all_requests_complete() {
        let vcs = Arc::new(FakeVcs::new("main"));
        let executor = Arc::new(always_succeeds(Duration::ZERO));
        let orchestrator = Orchestrator::new(test_config(2), vcs, executor);

        let report = orchestrator.run(requests(5)).await.unwrap();

        assert_eq!(report.status, ReportStatus::Completed);
        assert_eq!(report.summary.passed, 5);
        assert_eq!(report.summary.failed, 0);
        assert!((report.summary.success_rate - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn all_requests_fail_yields_failed_status() {
        let vcs = Arc::new(FakeVcs::new("main"));
        let executor = Arc::new(always_raises("task blew up"));
        let orchestrator = Orchestrator::new(test_config(2), vcs, executor);

        let report = orchestrator.run(requests(3)).await.unwrap();

        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.summary.passed, 0);
        assert_eq!(report.summary.failed, 3);
    }

    #[tokio::test]
    async fn mixed_outcomes_yield_partial_success() {
        let vcs = Arc::new(FakeVcs::new("main"));
        // Every third call fails, the rest succeed.
        let executor = Arc::new(crate::executor::fake::FakeExecutor::new(|call| {
            if call % 3 == 0 {
                anyhow::bail!("flaky failure")
            } else {
                Ok(crate::executor::ExecutionOutcome::success(1))
            }
        }));
        let orchestrator = Orchestrator::new(test_config(1), vcs, executor);

        let report = orchestrator.run(requests(6)).await.unwrap();

        assert_eq!(report.status, ReportStatus::PartialSuccess);
        assert_eq!(report.summary.passed + report.summary.failed, 6);
        assert!(report.summary.passed > 0);
        assert!(report.summary.failed > 0);
    }

    #[tokio::test]
    async fn submit_applies_session_defaults_to_a_request_left_unset() {
        let vcs = Arc::new(FakeVcs::new("main"));
        let executor = Arc::new(always_succeeds(Duration::ZERO));
        let config = OrchestratorConfig {
            default_max_retries: 5,
            default_task_timeout: Duration::from_secs(42),
            ..test_config(0)
        };
        let orchestrator = Orchestrator::new(config, vcs, executor);
        orchestrator.initialize().await.unwrap();
        orchestrator.start().await.unwrap();

        // Built with RequestConfig::default(), i.e. no explicit override.
        let unset = Request::new("plans/a.yaml", RequestConfig::default());
        // Explicit override should survive untouched.
        let mut overridden_config = RequestConfig::default();
        overridden_config.max_retries = 1;
        let overridden = Request::new("plans/b.yaml", overridden_config);

        orchestrator.submit(unset).await.unwrap();
        orchestrator.submit(overridden).await.unwrap();

        // No workers are running, so both requests are still sitting on the
        // queue with whatever config submit() left them with.
        let first = orchestrator.queue.dequeue().await.unwrap();
        assert_eq!(first.config.max_retries, 5);
        assert_eq!(first.config.task_timeout, Duration::from_secs(42));
        let second = orchestrator.queue.dequeue().await.unwrap();
        assert_eq!(second.config.max_retries, 1);
    }

    #[tokio::test]
    async fn submit_before_start_errors() {
        let vcs = Arc::new(FakeVcs::new("main"));
        let executor = Arc::new(always_succeeds(Duration::ZERO));
        let orchestrator = Orchestrator::new(test_config(1), vcs, executor);
        orchestrator.initialize().await.unwrap();

        let result = orchestrator.submit(requests(1).remove(0)).await;
        assert!(matches!(result, Err(OrchestratorError::NotRunning)));
    }

    #[tokio::test]
    async fn pool_exhaustion_fails_requests_that_cannot_acquire_in_time() {
        let vcs = Arc::new(FakeVcs::new("main"));
        let executor = Arc::new(always_succeeds(Duration::from_millis(300)));
        // A single worker/workspace with many requests: later ones should
        // still all complete since they simply queue behind the running one,
        // as long as the acquire timeout exceeds the execution time.
        let config = OrchestratorConfig {
            worktree_acquire_timeout: Duration::from_secs(2),
            ..test_config(1)
        };
        let orchestrator = Orchestrator::new(config, vcs, executor);

        let report = orchestrator.run(requests(3)).await.unwrap();

        assert_eq!(report.status, ReportStatus::Completed);
        assert_eq!(report.summary.passed, 3);
    }

    #[tokio::test]
    async fn get_status_reports_worker_and_pool_counts() {
        let vcs = Arc::new(FakeVcs::new("main"));
        let executor = Arc::new(always_succeeds(Duration::from_millis(100)));
        let orchestrator = Orchestrator::new(test_config(2), vcs, executor);
        orchestrator.initialize().await.unwrap();
        orchestrator.start().await.unwrap();

        let status = orchestrator.get_status().await;
        assert_eq!(status.workers.len(), 2);
        assert_eq!(status.pool.num_free, 2);

        orchestrator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_skips_cleanup_when_preserving_failed_workspaces() {
        let vcs = Arc::new(FakeVcs::new("main"));
        let executor = Arc::new(always_raises("task blew up"));
        let config = OrchestratorConfig {
            preserve_failed_workspaces: true,
            ..test_config(1)
        };
        let orchestrator = Orchestrator::new(config, vcs, executor);

        let report = orchestrator.run(requests(2)).await.unwrap();

        assert_eq!(report.status, ReportStatus::Failed);
        let status = orchestrator.get_status().await;
        assert!(!status.pool.workspaces.is_empty(), "failed workspaces should survive shutdown for inspection");
    }

    #[tokio::test]
    async fn shutdown_cleans_up_failed_workspaces_when_not_preserving() {
        let vcs = Arc::new(FakeVcs::new("main"));
        let executor = Arc::new(always_raises("task blew up"));
        let orchestrator = Orchestrator::new(test_config(1), vcs, executor);

        let report = orchestrator.run(requests(2)).await.unwrap();

        assert_eq!(report.status, ReportStatus::Failed);
        let status = orchestrator.get_status().await;
        assert!(status.pool.workspaces.is_empty(), "cleanup_on_completion should tear down workspaces by default");
    }
}
