use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pool::PoolStatus;
use crate::queue::QueueStatus;
use crate::worker::WorkerStatus;

/// Aggregate, point-in-time view across the pool, the queue, and every
/// worker -- what `planrunner status` reports.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub session_id: uuid::Uuid,
    pub initialized: bool,
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub pool: PoolStatus,
    pub queue: QueueStatus,
    pub workers: Vec<WorkerStatus>,
}
