use std::path::PathBuf;
use std::time::Duration;

use hyper::body::Bytes;
use hyper::{Method, StatusCode};

use super::transport::UnixTransport;
use super::{
    Action, ContainerRuntime, ContainerSummary, Error, Result, RuntimeState, Transition,
    validate_name,
};

pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";
/// Per-request timeout used until [`DockerRuntime::with_timeout`] is called.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectResponse {
    state: InspectState,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    #[serde(default)]
    paused: bool,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListEntry {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    message: String,
}

fn state_from_status(status: &str) -> RuntimeState {
    match status {
        "running" => RuntimeState::Running,
        "paused" => RuntimeState::Paused,
        _ => RuntimeState::Stopped,
    }
}

fn status_error(path: &str, status: StatusCode, body: &Bytes) -> Error {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_owned());
    Error::Status {
        path: path.to_owned(),
        status: status.as_u16(),
        message,
    }
}

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    transport: UnixTransport,
}

impl DockerRuntime {
    /// Creates a runtime talking to the engine socket at `socket_path`.
    ///
    /// No connection is made until the first call.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            transport: UnixTransport::new(socket_path, DEFAULT_REQUEST_TIMEOUT),
        }
    }

    /// Bounds every request sent to the engine by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport.set_timeout(timeout);
        self
    }

    /// Pauses or unpauses `name` unless it already is in the target state.
    ///
    /// A container that is neither in the action's source nor target state
    /// (e.g. exited) is reported as [`Error::InvalidState`].
    async fn transition(&self, name: &str, action: Action) -> Result<Transition> {
        validate_name(name)?;
        match self.inspect_state(name).await? {
            state if state == action.target() => {
                log::debug!("container `{name}` is already {state}");
                return Ok(Transition::AlreadyInState);
            }
            RuntimeState::Missing => return Err(Error::NotFound(name.to_owned())),
            state if state != action.source() => {
                return Err(Error::InvalidState {
                    name: name.to_owned(),
                    action,
                    state,
                });
            }
            _ => {}
        }

        let path = format!("/containers/{name}/{action}");
        let (status, body) = self.transport.send(Method::POST, &path).await?;
        match status {
            status if status.is_success() => Ok(Transition::Applied),
            StatusCode::NOT_FOUND => Err(Error::NotFound(name.to_owned())),
            StatusCode::CONFLICT => {
                // Lost a race with someone else doing the same thing.
                if self.inspect_state(name).await? == action.target() {
                    Ok(Transition::AlreadyInState)
                } else {
                    Err(status_error(&path, status, &body))
                }
            }
            status => Err(status_error(&path, status, &body)),
        }
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn pause(&self, name: &str) -> Result<Transition> {
        self.transition(name, Action::Pause).await
    }

    async fn unpause(&self, name: &str) -> Result<Transition> {
        self.transition(name, Action::Unpause).await
    }

    async fn inspect_state(&self, name: &str) -> Result<RuntimeState> {
        validate_name(name)?;
        let path = format!("/containers/{name}/json");
        let (status, body) = self.transport.send(Method::GET, &path).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(RuntimeState::Missing);
        }
        if !status.is_success() {
            return Err(status_error(&path, status, &body));
        }

        let inspect: InspectResponse =
            serde_json::from_slice(&body).map_err(|source| Error::Decode {
                path: path.clone(),
                source,
            })?;
        if inspect.state.paused {
            return Ok(RuntimeState::Paused);
        }
        Ok(state_from_status(&inspect.state.status))
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let path = "/containers/json?all=true";
        let (status, body) = self.transport.send(Method::GET, path).await?;
        if !status.is_success() {
            return Err(status_error(path, status, &body));
        }

        let entries: Vec<ListEntry> =
            serde_json::from_slice(&body).map_err(|source| Error::Decode {
                path: path.to_owned(),
                source,
            })?;
        let mut containers: Vec<ContainerSummary> = entries
            .into_iter()
            .map(|entry| ContainerSummary {
                name: entry
                    .names
                    .first()
                    .map(|n| n.trim_start_matches('/').to_owned())
                    .unwrap_or_else(|| entry.id.chars().take(12).collect()),
                id: entry.id.chars().take(12).collect(),
                image: entry.image,
                state: state_from_status(&entry.state),
                status: entry.status,
            })
            .collect();
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    async fn ping(&self) -> Result<()> {
        let (status, body) = self.transport.send(Method::GET, "/_ping").await?;
        if !status.is_success() {
            return Err(status_error("/_ping", status, &body));
        }
        Ok(())
    }
}
