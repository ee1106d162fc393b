//! Container runtime adapter.
//!
//! Pause, unpause and inspect operations addressed by container name. Pausing
//! a container that is already paused (or unpausing one that is already
//! running) is not an error: it yields [`Transition::AlreadyInState`], so that
//! repeated ticks issuing the same command never fail.
//!
//! [`DockerRuntime`] implements [`ContainerRuntime`] against the Docker Engine
//! API, spoken as plain HTTP/1.1 over the engine's unix socket.
mod docker;
mod error;
mod transport;

use std::fmt;
use std::future::Future;

pub use docker::{DEFAULT_SOCKET_PATH, DockerRuntime};
pub use error::{Error, Result};

/// Observed state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeState {
    Running,
    Paused,
    /// Exists but neither running nor paused (created, exited, dead, ...).
    Stopped,
    Missing,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuntimeState::Running => "running",
            RuntimeState::Paused => "paused",
            RuntimeState::Stopped => "stopped",
            RuntimeState::Missing => "missing",
        };
        f.write_str(s)
    }
}

/// A pause or unpause request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Pause,
    Unpause,
}

impl Action {
    /// State the container must be in for the action to do anything.
    pub fn source(self) -> RuntimeState {
        match self {
            Action::Pause => RuntimeState::Running,
            Action::Unpause => RuntimeState::Paused,
        }
    }

    /// State the container is in after the action succeeded.
    pub fn target(self) -> RuntimeState {
        match self {
            Action::Pause => RuntimeState::Paused,
            Action::Unpause => RuntimeState::Running,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Pause => "pause",
            Action::Unpause => "unpause",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful pause/unpause call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The runtime changed the container's state.
    Applied,
    /// The container already was in the requested state; nothing was done.
    AlreadyInState,
}

/// A container as listed by the runtime, for discovery.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ContainerSummary {
    pub name: String,
    pub id: String,
    pub image: String,
    pub state: RuntimeState,
    /// Human readable status, e.g. `Up 2 hours (Paused)`.
    pub status: String,
}

/// Operations the monitor needs from a container engine.
pub trait ContainerRuntime: Send + Sync {
    fn pause(&self, name: &str) -> impl Future<Output = Result<Transition>> + Send;

    fn unpause(&self, name: &str) -> impl Future<Output = Result<Transition>> + Send;

    /// Reports the current state; a container that does not exist is
    /// [`RuntimeState::Missing`], not an error.
    fn inspect_state(&self, name: &str) -> impl Future<Output = Result<RuntimeState>> + Send;

    /// Lists every container, running or not.
    fn list_containers(&self) -> impl Future<Output = Result<Vec<ContainerSummary>>> + Send;

    /// Checks that the engine is reachable.
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;

    /// Dispatches to [`pause`](Self::pause) or [`unpause`](Self::unpause).
    fn apply(&self, name: &str, action: Action) -> impl Future<Output = Result<Transition>> + Send {
        async move {
            match action {
                Action::Pause => self.pause(name).await,
                Action::Unpause => self.unpause(name).await,
            }
        }
    }
}

/// Checks that `name` is a valid container name or id, so it can be placed in
/// an API path as is.
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_states() {
        assert_eq!(Action::Pause.source(), RuntimeState::Running);
        assert_eq!(Action::Pause.target(), RuntimeState::Paused);
        assert_eq!(Action::Unpause.source(), RuntimeState::Paused);
        assert_eq!(Action::Unpause.target(), RuntimeState::Running);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("sonarr").is_ok());
        assert!(validate_name("tdarr_node-1.2").is_ok());
        assert!(validate_name("0a1b2c3d").is_ok());

        for bad in ["", "-leading", "a/b", "../x", "a b", "name?all=1"] {
            assert!(
                matches!(validate_name(bad), Err(Error::InvalidName(_))),
                "`{bad}` should be rejected"
            );
        }
    }
}
