/// Errors returned by the media-session client.
///
/// Every variant is transient from the monitor's point of view: a failed fetch
/// only aborts the decisions of the current tick.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server could not be reached, timed out, or answered with an
    /// unexpected HTTP status.
    #[error("cannot reach media server at `{url}`: {reason}")]
    Connection { url: String, reason: String },
    /// The API key is missing or was rejected.
    #[error("media server authentication failed: {0}")]
    Auth(String),
    #[error("failed to parse media server response: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
