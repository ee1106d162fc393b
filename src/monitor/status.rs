use crate::engine::ContainerState;
use crate::runtime::ContainerSummary;

/// Snapshot of the poll loop, as shown by `GET /api/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    /// Unix time of the last completed tick.
    pub last_poll: Option<u64>,
    pub last_error: Option<String>,
    pub active_sessions: usize,
    pub sessions_active: bool,
    /// Managed containers whose state is currently `Error`.
    pub errored_containers: usize,
    /// Detail of the last pause or unpause that changed a container.
    pub last_action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ManagedContainerStatus {
    pub name: String,
    pub enabled: bool,
    pub description: String,
    pub state: ContainerState,
}

/// A container reported by the runtime, joined with its management settings.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DiscoveredContainer {
    #[serde(flatten)]
    pub summary: ContainerSummary,
    pub managed: bool,
    pub enabled: bool,
}
