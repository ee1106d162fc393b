//! Media-server session client.
//!
//! Queries the media server (Jellyfin) for its playback sessions and decides
//! which of them count as *active*: only sessions that are genuinely playing
//! something. A session paused by the user, or a client that is merely
//! connected and browsing, does not keep containers paused.
//!
//! # Key Components
//!
//! - [`SessionSource`]: the seam the monitor polls through.
//! - [`JellyfinClient`]: the HTTP implementation backed by `reqwest`.
//! - [`Session`] / [`PlayState`]: the parsed, ephemeral session view.
mod error;
mod jellyfin;
mod session;

use std::future::Future;

pub use error::{Error, Result};
pub use jellyfin::{Endpoint, JellyfinClient, ServerInfo};
pub use session::{PlayState, Session, parse_sessions};

/// A source of playback sessions.
pub trait SessionSource: Send + Sync {
    /// Returns every session the media server reports, active or not.
    fn fetch_sessions(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Vec<Session>>> + Send;

    /// Queries the server's identity, used as a connection test.
    fn server_info(&self, endpoint: &Endpoint) -> impl Future<Output = Result<ServerInfo>> + Send;

    /// Returns only the sessions that are currently playing.
    fn fetch_active_sessions(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Vec<Session>>> + Send {
        async move {
            let sessions = self.fetch_sessions(endpoint).await?;
            Ok(sessions.into_iter().filter(Session::is_active).collect())
        }
    }
}
