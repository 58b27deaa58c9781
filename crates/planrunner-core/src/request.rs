//! Requests: the unit of work submitted to the runtime.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a request, stable for the lifetime of a session.
pub type RequestId = Uuid;

/// Per-request execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Wall-time budget for the task executor invocation.
    #[serde(with = "humantime_duration")]
    pub task_timeout: Duration,
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Whether a passing result should be auto-merged by the (external)
    /// task executor. Carried through unchanged; the core never inspects
    /// this flag itself.
    pub auto_merge: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(300),
            max_retries: 0,
            auto_merge: false,
        }
    }
}

/// One unit of work: a reference to a plan artifact plus configuration.
///
/// `retry_count` starts at 0 and only ever increases, via
/// [`crate::queue::RequestQueue::requeue_for_retry`]. Every other field is
/// immutable after construction.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    /// Reference to the plan artifact (owned by the external plan-parser).
    pub plan_ref: String,
    /// Optional sub-range selector within the plan.
    pub sub_range: Option<String>,
    pub config: RequestConfig,
    pub retry_count: u32,
    pub submitted_at: DateTime<Utc>,
}

impl Request {
    /// Construct a new request with a fresh id and `submitted_at` stamped
    /// to now.
    pub fn new(plan_ref: impl Into<String>, config: RequestConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan_ref: plan_ref.into(),
            sub_range: None,
            config,
            retry_count: 0,
            submitted_at: Utc::now(),
        }
    }

    /// Builder-style setter for `sub_range`.
    pub fn with_sub_range(mut self, sub_range: impl Into<String>) -> Self {
        self.sub_range = Some(sub_range.into());
        self
    }
}

/// (De)serialize a [`Duration`] as a plain number of seconds, so submission
/// files can write `task_timeout = 300` rather than a nested struct.
mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
