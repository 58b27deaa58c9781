//! Request queue: bounded FIFO of pending requests plus accounting of
//! running/completed/failed requests.
//!
//! Mirrors the pool's concurrency discipline: a single mutex guards the
//! four logical collections, and [`tokio::sync::Notify`] pairs stand in
//! for condition variables. Every waiter creates its `Notified` future
//! *before* re-checking its predicate and dropping the lock, which is the
//! standard lost-wakeup-free pattern for `Notify`.

mod status;

pub use status::{QueueStatus, ResultsSummary};

use std::collections::{HashMap, VecDeque};

use tokio::sync::{Mutex, Notify};

use crate::error::QueueError;
use crate::request::{Request, RequestId};
use crate::result::{TaskResult, TerminalStatus};

struct QueueState {
    pending: VecDeque<Request>,
    running: HashMap<RequestId, Request>,
    completed: HashMap<RequestId, TaskResult>,
    failed: HashMap<RequestId, TaskResult>,
    closed: bool,
}

impl QueueState {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            running: HashMap::new(),
            completed: HashMap::new(),
            failed: HashMap::new(),
            closed: false,
        }
    }

    fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }
}

/// Bounded FIFO of pending requests, with in-memory indexes of running,
/// completed, and failed requests.
pub struct RequestQueue {
    max_size: usize,
    state: Mutex<QueueState>,
    not_empty: Notify,
    not_full: Notify,
    drained: Notify,
}

impl RequestQueue {
    /// Construct a new queue. `max_size` must be greater than zero.
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "max_size must be greater than zero");
        Self {
            max_size,
            state: Mutex::new(QueueState::new()),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            drained: Notify::new(),
        }
    }

    /// Append `req` to the tail of the pending queue. Blocks while the
    /// queue is at capacity; fails immediately if the queue has been
    /// closed.
    pub async fn enqueue(&self, req: Request) -> Result<(), QueueError> {
        loop {
            let notified = self.not_full.notified();
            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(QueueError::Closed);
                }
                if state.pending.len() < self.max_size {
                    state.pending.push_back(req);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Enqueue each request in order; each obeys back-pressure
    /// individually.
    pub async fn enqueue_batch(&self, reqs: Vec<Request>) -> Result<(), QueueError> {
        for req in reqs {
            self.enqueue(req).await?;
        }
        Ok(())
    }

    /// Block until a request is available or the queue is closed and
    /// drained, in which case `None` is returned.
    pub async fn dequeue(&self) -> Option<Request> {
        loop {
            let notified = self.not_empty.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(req) = state.pending.pop_front() {
                    self.not_full.notify_one();
                    return Some(req);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Move `req` into the running set. Pre: `req.id` is not already
    /// tracked anywhere.
    pub async fn mark_running(&self, req: Request) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if state.running.contains_key(&req.id)
            || state.completed.contains_key(&req.id)
            || state.failed.contains_key(&req.id)
        {
            return Err(QueueError::AlreadyTracked(req.id));
        }
        state.running.insert(req.id, req);
        Ok(())
    }

    /// Remove `id` from running and record a completed result. Idempotent:
    /// calling this twice for the same id has the same observable effect
    /// as calling it once.
    pub async fn mark_complete(&self, id: RequestId, result: TaskResult) {
        debug_assert_eq!(result.status, TerminalStatus::Complete);
        let mut state = self.state.lock().await;
        state.running.remove(&id);
        state.completed.insert(id, result);
        if state.is_drained() {
            self.drained.notify_waiters();
        }
    }

    /// Remove `id` from running and record a failed result (retries
    /// exhausted).
    pub async fn mark_failed(&self, id: RequestId, result: TaskResult) {
        debug_assert_eq!(result.status, TerminalStatus::Failed);
        let mut state = self.state.lock().await;
        state.running.remove(&id);
        state.failed.insert(id, result);
        if state.is_drained() {
            self.drained.notify_waiters();
        }
    }

    /// If `req` has retries remaining, increment its counter and
    /// re-enqueue it at the tail, returning `true`. Otherwise return
    /// `false` without modifying `req` or queue state -- the caller must
    /// then call [`Self::mark_failed`].
    pub async fn requeue_for_retry(&self, mut req: Request) -> bool {
        if req.retry_count + 1 > req.config.max_retries {
            return false;
        }
        req.retry_count += 1;
        let id = req.id;
        let mut state = self.state.lock().await;
        state.running.remove(&id);
        state.pending.push_back(req);
        self.not_empty.notify_one();
        // The drain predicate may have been transiently about to hold
        // (running just emptied); notify so a waiter re-evaluates even
        // though pending is now non-empty.
        self.drained.notify_waiters();
        true
    }

    /// Close the queue to new submissions. Already-pending/running
    /// requests are unaffected; blocked `dequeue` calls observe the
    /// closure once pending drains.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        drop(state);
        self.not_full.notify_waiters();
        self.not_empty.notify_waiters();
    }

    /// Block until `pending` and `running` are both empty.
    pub async fn wait_until_empty(&self) {
        loop {
            let notified = self.drained.notified();
            {
                let state = self.state.lock().await;
                if state.is_drained() {
                    return;
                }
            }
            notified.await;
        }
    }

    pub async fn get_status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        QueueStatus {
            pending_count: state.pending.len(),
            running_count: state.running.len(),
            completed_count: state.completed.len(),
            failed_count: state.failed.len(),
            closed: state.closed,
        }
    }

    pub async fn get_results_summary(&self) -> ResultsSummary {
        let state = self.state.lock().await;
        ResultsSummary::new(state.pending.len(), state.running.len(), &state.completed, &state.failed)
    }

    /// Ordered (by completion time) list of completed results.
    pub async fn completed_results(&self) -> Vec<TaskResult> {
        let state = self.state.lock().await;
        let mut results: Vec<TaskResult> = state.completed.values().cloned().collect();
        results.sort_by_key(|r| r.completed_at);
        results
    }

    /// Ordered (by completion time) list of failed results.
    pub async fn failed_results(&self) -> Vec<TaskResult> {
        let state = self.state.lock().await;
        let mut results: Vec<TaskResult> = state.failed.values().cloned().collect();
        results.sort_by_key(|r| r.completed_at);
        results
    }

    /// Empty all four collections. Does not reopen a closed queue.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.pending.clear();
        state.running.clear();
        state.completed.clear();
        state.failed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestConfig;
    use std::sync::Arc;

    fn req() -> Request {
        Request::new("plans/a.yaml", RequestConfig::default())
    }

    #[tokio::test]
    async fn enqueue_dequeue_round_trip() {
        let queue = RequestQueue::new(4);
        let r = req();
        let id = r.id;
        queue.enqueue(r).await.unwrap();

        let dequeued = queue.dequeue().await.unwrap();
        assert_eq!(dequeued.id, id);
    }

    #[tokio::test]
    async fn enqueue_after_close_errors() {
        let queue = RequestQueue::new(4);
        queue.close().await;
        let result = queue.enqueue(req()).await;
        assert!(matches!(result, Err(QueueError::Closed)));
    }

    #[tokio::test]
    async fn dequeue_blocks_until_enqueue_then_returns() {
        let queue = Arc::new(RequestQueue::new(4));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let r = req();
        let id = r.id;
        queue.enqueue(r).await.unwrap();

        let dequeued = waiter.await.unwrap().unwrap();
        assert_eq!(dequeued.id, id);
    }

    #[tokio::test]
    async fn dequeue_returns_none_once_closed_and_drained() {
        let queue = RequestQueue::new(4);
        queue.close().await;
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn mark_running_rejects_duplicate_tracking() {
        let queue = RequestQueue::new(4);
        let r = req();
        queue.mark_running(r.clone()).await.unwrap();
        let result = queue.mark_running(r).await;
        assert!(matches!(result, Err(QueueError::AlreadyTracked(_))));
    }

    #[tokio::test]
    async fn mark_complete_is_idempotent() {
        let queue = RequestQueue::new(4);
        let r = req();
        let id = r.id;
        queue.mark_running(r).await.unwrap();

        let now = chrono::Utc::now();
        let result = TaskResult::complete(id, crate::pool::WorkspaceId::new(1), 3, 0, now, now);
        queue.mark_complete(id, result.clone()).await;
        queue.mark_complete(id, result).await;

        let status = queue.get_status().await;
        assert_eq!(status.completed_count, 1);
        assert_eq!(status.running_count, 0);
    }

    #[tokio::test]
    async fn requeue_for_retry_respects_max_retries() {
        let queue = RequestQueue::new(4);
        let mut r = req();
        r.config.max_retries = 1;
        queue.mark_running(r.clone()).await.unwrap();

        assert!(queue.requeue_for_retry(r.clone()).await);
        let status = queue.get_status().await;
        assert_eq!(status.pending_count, 1);
        assert_eq!(status.running_count, 0);

        let retried = queue.dequeue().await.unwrap();
        assert_eq!(retried.retry_count, 1);
        queue.mark_running(retried.clone()).await.unwrap();
        assert!(!queue.requeue_for_retry(retried).await);
    }

    #[tokio::test]
    async fn success_rate_math() {
        let queue = RequestQueue::new(4);
        let now = chrono::Utc::now();

        for _ in 0..3 {
            let r = req();
            let id = r.id;
            queue.mark_running(r).await.unwrap();
            queue.mark_complete(id, TaskResult::complete(id, crate::pool::WorkspaceId::new(1), 1, 0, now, now)).await;
        }
        let r = req();
        let id = r.id;
        queue.mark_running(r).await.unwrap();
        queue.mark_failed(id, TaskResult::failed(id, None, "boom", now, now)).await;

        let summary = queue.get_results_summary().await;
        assert_eq!(summary.passed, 3);
        assert_eq!(summary.failed, 1);
        assert!((summary.success_rate - 75.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn success_rate_is_zero_with_no_terminal_results() {
        let queue = RequestQueue::new(4);
        let summary = queue.get_results_summary().await;
        assert_eq!(summary.success_rate, 0.0);
    }

    #[tokio::test]
    async fn wait_until_empty_returns_once_drained() {
        let queue = Arc::new(RequestQueue::new(4));
        let r = req();
        let id = r.id;
        queue.mark_running(r).await.unwrap();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait_until_empty().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let now = chrono::Utc::now();
        queue.mark_complete(id, TaskResult::complete(id, crate::pool::WorkspaceId::new(1), 1, 0, now, now)).await;

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("wait_until_empty should return promptly")
            .unwrap();
    }
}
