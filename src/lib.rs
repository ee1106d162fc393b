use std::path::PathBuf;
use std::sync::Arc;

use error::ResultOkLogExt;
use media::SessionSource;
use runtime::ContainerRuntime;

/// Pausarr: pauses Docker containers while a Jellyfin server is streaming.
///
/// Every few seconds the monitor asks the media server for its playback
/// sessions. While anything is playing, the managed containers (download
/// clients, indexers, transcoders, ...) are paused so they do not compete for
/// disk and network; once playback stops they are unpaused again.
pub mod activity;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod media;
pub mod monitor;
pub mod runtime;

#[cfg(test)]
mod testing;

const DEFAULT_PORT: u16 = 5000;

/// Runs the Pausarr service.
///
/// Loads the configuration, checks the connections to Docker and the media
/// server, starts the monitor (when enabled and an API key is configured) and
/// serves the REST API until `Ctrl-C`.
///
/// # Errors
///
/// Possible errors include:
/// - An invalid `PORT` environment variable.
/// - Failure to build the HTTP client.
/// - Failure to bind the API listener.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var_os("CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_PATH));
    let config = Arc::new(config::ConfigStore::load(&config_path));
    let settings = config.snapshot();

    let socket = std::env::var_os("DOCKER_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(runtime::DEFAULT_SOCKET_PATH));
    let docker = runtime::DockerRuntime::new(&socket).with_timeout(settings.runtime_timeout());
    if docker
        .ping()
        .await
        .ok_warn("Docker is not reachable")
        .is_some()
    {
        log::info!("Connected to Docker at `{}`", socket.display());
    }

    let jellyfin = media::JellyfinClient::new()?;
    if settings.has_api_key() {
        if let Some(info) = jellyfin
            .server_info(&settings.endpoint())
            .await
            .ok_warn("Media server is not reachable")
        {
            log::info!(
                "Connected to {} {} at {}",
                info.server_name,
                info.version,
                settings.jellyfin_url
            );
        }
    } else {
        log::warn!("No Jellyfin API key configured, set one through the API");
    }

    let monitor = monitor::Monitor::new(Arc::clone(&config), jellyfin, docker);
    if settings.enabled && settings.has_api_key() {
        monitor.start().await;
    }

    let port = match std::env::var("PORT") {
        Ok(port) => port
            .parse::<u16>()
            .map_err(|err| format!("invalid PORT `{port}`: {err}"))?,
        Err(_) => DEFAULT_PORT,
    };
    let server = api::APIServer::new(monitor.clone());

    tokio::select! {
        res = server.listen(("0.0.0.0", port)) => res?,
        res = tokio::signal::ctrl_c() => {
            res?;
            log::info!("Shutting down");
        }
    }

    monitor.stop().await;
    Ok(())
}
