use serde::Serialize;

use super::{WorkspaceDescriptor, WorkspaceState};

/// Point-in-time snapshot of one workspace, exposed via
/// [`super::WorkspacePool::get_status`].
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceStatus {
    pub id: String,
    pub state: WorkspaceState,
    pub current_request: Option<uuid::Uuid>,
}

/// Aggregate pool status: per-workspace state plus the counts the
/// orchestrator and CLI report on.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub workspaces: Vec<WorkspaceStatus>,
    pub num_free: usize,
    pub num_busy: usize,
    pub num_error: usize,
}

impl PoolStatus {
    pub(super) fn from_descriptors<'a>(descriptors: impl Iterator<Item = &'a WorkspaceDescriptor>) -> Self {
        let mut workspaces = Vec::new();
        let (mut num_free, mut num_busy, mut num_error) = (0, 0, 0);

        for desc in descriptors {
            match desc.state {
                WorkspaceState::Free => num_free += 1,
                WorkspaceState::Busy => num_busy += 1,
                WorkspaceState::Error => num_error += 1,
            }
            workspaces.push(WorkspaceStatus {
                id: desc.id.as_str().to_string(),
                state: desc.state,
                current_request: desc.current_request,
            });
        }
        workspaces.sort_by(|a, b| a.id.cmp(&b.id));

        Self {
            workspaces,
            num_free,
            num_busy,
            num_error,
        }
    }
}
