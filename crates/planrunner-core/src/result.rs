//! Terminal results of executing a request.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pool::WorkspaceId;
use crate::request::RequestId;

/// Terminal status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalStatus {
    Complete,
    Failed,
}

/// Outcome of running one request to completion (or exhausting retries).
///
/// `status == Complete` implies `error` is `None`; `status == Failed`
/// implies `error` is `Some`. These invariants are enforced by the
/// [`TaskResult::complete`] / [`TaskResult::failed`] constructors -- there
/// is no public way to build an inconsistent value.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub request_id: RequestId,
    pub workspace_id: Option<WorkspaceId>,
    pub status: TerminalStatus,
    pub tasks_passed: u32,
    pub tasks_failed: u32,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn complete(
        request_id: RequestId,
        workspace_id: WorkspaceId,
        tasks_passed: u32,
        tasks_failed: u32,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            workspace_id: Some(workspace_id),
            status: TerminalStatus::Complete,
            tasks_passed,
            tasks_failed,
            error: None,
            started_at,
            completed_at,
        }
    }

    pub fn failed(
        request_id: RequestId,
        workspace_id: Option<WorkspaceId>,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            workspace_id,
            status: TerminalStatus::Failed,
            tasks_passed: 0,
            tasks_failed: 0,
            error: Some(error.into()),
            started_at,
            completed_at,
        }
    }

    /// Wall-clock duration of the run, computed from the recorded
    /// timestamps (never stored redundantly).
    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}
