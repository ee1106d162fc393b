use std::path::PathBuf;
use std::time::Duration;

/// Errors returned by the container runtime adapter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("container `{0}` not found")]
    NotFound(String),
    #[error("invalid container name `{0}`")]
    InvalidName(String),
    #[error("cannot {action} container `{name}`: it is {state}")]
    InvalidState {
        name: String,
        action: super::Action,
        state: super::RuntimeState,
    },
    #[error("failed to connect to container engine socket `{path}`: {source}")]
    SocketConnect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("container engine transport error: {0}")]
    Transport(#[source] hyper::Error),
    #[error("failed to build container engine request: {0}")]
    Request(#[source] hyper::http::Error),
    #[error("container engine returned HTTP {status} for `{path}`: {message}")]
    Status {
        path: String,
        status: u16,
        message: String,
    },
    #[error("failed to decode container engine response for `{path}`: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("container engine request `{path}` timed out after {timeout:?}")]
    RequestTimeout { path: String, timeout: Duration },
    #[error("{operation} of container `{name}` timed out after {timeout:?}")]
    Timeout {
        name: String,
        operation: &'static str,
        timeout: Duration,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
