use std::time::Duration;

use serde::Serialize;

use crate::request::RequestId;

/// Point-in-time snapshot of one worker, exposed via
/// [`super::ExecutionWorker::get_status`].
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub id: String,
    pub running: bool,
    pub current_request: Option<RequestId>,
    #[serde(with = "humantime_duration")]
    pub dequeue_poll_interval: Duration,
    #[serde(with = "humantime_duration")]
    pub worktree_acquire_timeout: Duration,
}

mod humantime_duration {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}
