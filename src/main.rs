/// Entry point for Pausarr.
///
/// Pauses the managed Docker containers while the Jellyfin server is
/// streaming and exposes a REST API to configure and control the monitor.
///
/// # Errors
///
/// Returns an error if startup fails (e.g., an invalid `PORT` or a port that
/// is already in use).
///
/// # Examples
///
/// ```bash
/// JELLYFIN_URL=http://jellyfin:8096 JELLYFIN_API_KEY=... \
///     CONTAINERS_TO_PAUSE=sonarr,radarr cargo run
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    pausarr::run().await
}
