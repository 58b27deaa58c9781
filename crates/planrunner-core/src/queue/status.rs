use std::collections::HashMap;

use serde::Serialize;

use crate::request::RequestId;
use crate::result::TaskResult;

/// Point-in-time counts across the four logical collections.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub pending_count: usize,
    pub running_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub closed: bool,
}

/// Pass/fail accounting derived from terminal results.
#[derive(Debug, Clone, Serialize)]
pub struct ResultsSummary {
    pub pending_count: usize,
    pub running_count: usize,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// `100 * passed / (passed + failed)`, or `0` when no terminal result
    /// has been observed yet.
    pub success_rate: f64,
}

impl ResultsSummary {
    pub(super) fn new(
        pending_count: usize,
        running_count: usize,
        completed: &HashMap<RequestId, TaskResult>,
        failed: &HashMap<RequestId, TaskResult>,
    ) -> Self {
        let passed = completed.len();
        let failed_count = failed.len();
        let denom = passed + failed_count;
        let success_rate = if denom == 0 {
            0.0
        } else {
            100.0 * passed as f64 / denom as f64
        };
        Self {
            pending_count,
            running_count,
            total: denom,
            passed,
            failed: failed_count,
            success_rate,
        }
    }
}
