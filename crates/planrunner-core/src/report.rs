//! Session-level summary produced once a run finishes or is shut down.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::queue::ResultsSummary;
use crate::result::TaskResult;

/// Coarse outcome of a session, derived from its final tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    /// Every submitted request reached `COMPLETE`.
    Completed,
    /// At least one request completed and at least one failed.
    PartialSuccess,
    /// No request completed; at least one failed.
    Failed,
}

impl ReportStatus {
    fn from_counts(passed: usize, failed: usize) -> Self {
        match (passed, failed) {
            (_, 0) => ReportStatus::Completed,
            (0, _) => ReportStatus::Failed,
            _ => ReportStatus::PartialSuccess,
        }
    }
}

/// Final, serializable account of a single orchestrator session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: uuid::Uuid,
    pub status: ReportStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: ResultsSummary,
    pub completed: Vec<TaskResult>,
    pub failed: Vec<TaskResult>,
    pub worker_count: usize,
}

impl SessionReport {
    pub fn new(
        session_id: uuid::Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        summary: ResultsSummary,
        completed: Vec<TaskResult>,
        failed: Vec<TaskResult>,
        worker_count: usize,
    ) -> Self {
        let status = ReportStatus::from_counts(completed.len(), failed.len());
        Self {
            session_id,
            status,
            started_at,
            finished_at,
            summary,
            completed,
            failed,
            worker_count,
        }
    }
}
