use std::fmt;

use crate::activity::LogAction;
use crate::runtime::{Action, RuntimeState};

/// Last-known state of a container, as far as the engine is concerned.
///
/// This is a cache of the last successful observation or mutation, not a
/// guarantee of what the runtime currently does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// Not under pause/unpause control.
    Unmanaged,
    /// Managed, but not observed yet.
    #[default]
    Unknown,
    Running,
    Paused,
    /// The last runtime call failed; the state is re-inspected on the next pass.
    Error,
}

impl ContainerState {
    /// Maps an observed runtime state; `None` if it cannot be managed.
    pub fn from_runtime(state: RuntimeState) -> Option<Self> {
        match state {
            RuntimeState::Running => Some(ContainerState::Running),
            RuntimeState::Paused => Some(ContainerState::Paused),
            RuntimeState::Stopped | RuntimeState::Missing => None,
        }
    }

    /// State after `action` succeeded.
    pub fn after(action: Action) -> Self {
        match action {
            Action::Pause => ContainerState::Paused,
            Action::Unpause => ContainerState::Running,
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerState::Unmanaged => "unmanaged",
            ContainerState::Unknown => "unknown",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Error => "error",
        };
        f.write_str(s)
    }
}

/// A managed container as seen by one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedContainer {
    pub name: String,
    /// Disabled containers are skipped entirely and keep their last state.
    pub enabled: bool,
}

/// What a single engine step did to one container.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Outcome {
    pub container: String,
    pub action: LogAction,
    pub from: ContainerState,
    pub to: ContainerState,
    pub detail: String,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.action != LogAction::Error
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pass {
    /// Number of active sessions, or `None` if fetching them failed and the
    /// pass made no decisions.
    pub active_sessions: Option<usize>,
    pub outcomes: Vec<Outcome>,
}

impl Pass {
    pub fn count(&self, action: LogAction) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }
}
