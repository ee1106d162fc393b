use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::de::DeserializeOwned;
use tokio::net::ToSocketAddrs;

use crate::config::{self, SettingsPatch};
use crate::media::{self, SessionSource};
use crate::monitor::Monitor;
use crate::runtime::{self, ContainerRuntime};

mod models;

/// Number of activity entries returned when no `limit` is given.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error(transparent)]
    Media(#[from] media::Error),
    #[error(transparent)]
    Runtime(#[from] runtime::Error),
    #[error("invalid request body: {0}")]
    BadRequest(#[source] serde_json::Error),
}

type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::Config(config::Error::NotManaged(_)) => StatusCode::NOT_FOUND,
            Error::Config(config::Error::InvalidName(_)) => StatusCode::BAD_REQUEST,
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Media(media::Error::Client(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Media(_) => StatusCode::BAD_GATEWAY,
            Error::Runtime(runtime::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Runtime(runtime::Error::InvalidName(_)) => StatusCode::BAD_REQUEST,
            Error::Runtime(runtime::Error::InvalidState { .. }) => StatusCode::CONFLICT,
            Error::Runtime(_) => StatusCode::BAD_GATEWAY,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {self}");
        } else {
            log::debug!("Request rejected: {self}");
        }
        let body = models::ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Parses an optional JSON body; an empty body yields `T::default()`.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(Error::BadRequest)
}

fn required_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(Error::BadRequest)
}

async fn get_status<S, R>(State(monitor): State<Monitor<S, R>>) -> Json<models::StatusResponse>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    let settings = monitor.config().snapshot();
    Json(models::StatusResponse {
        status: monitor.status(),
        enabled: settings.enabled,
        check_interval_secs: settings.check_interval_secs,
        api_key_configured: settings.has_api_key(),
        managed_containers: settings.containers.len(),
        jellyfin_url: settings.jellyfin_url,
    })
}

async fn get_config<S, R>(State(monitor): State<Monitor<S, R>>) -> Json<config::Settings>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    Json(monitor.config().snapshot().masked())
}

async fn update_config<S, R>(
    State(monitor): State<Monitor<S, R>>,
    body: Bytes,
) -> Result<Json<config::Settings>>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    let patch: SettingsPatch = optional_body(&body)?;
    let settings = monitor.config().apply_patch(patch)?;
    log::info!("Configuration updated");
    Ok(Json(settings.masked()))
}

async fn discover_containers<S, R>(
    State(monitor): State<Monitor<S, R>>,
) -> Result<Json<Vec<crate::monitor::DiscoveredContainer>>>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    Ok(Json(monitor.discover_containers().await?))
}

async fn list_managed<S, R>(
    State(monitor): State<Monitor<S, R>>,
) -> Json<Vec<crate::monitor::ManagedContainerStatus>>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    Json(monitor.list_managed_containers())
}

async fn manage<S, R>(
    State(monitor): State<Monitor<S, R>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<models::ContainerFlag>>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    let request: models::ManageRequest = optional_body(&body)?;
    monitor.manage(&name, request.enabled, request.description)?;
    Ok(Json(models::ContainerFlag {
        name,
        managed: true,
        enabled: request.enabled,
    }))
}

async fn unmanage<S, R>(
    State(monitor): State<Monitor<S, R>>,
    Path(name): Path<String>,
) -> Result<Json<models::ContainerFlag>>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    if !monitor.unmanage(&name)? {
        return Err(config::Error::NotManaged(name).into());
    }
    Ok(Json(models::ContainerFlag {
        name,
        managed: false,
        enabled: false,
    }))
}

async fn toggle<S, R>(
    State(monitor): State<Monitor<S, R>>,
    Path(name): Path<String>,
) -> Result<Json<models::ContainerFlag>>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    let enabled = monitor.toggle(&name)?;
    Ok(Json(models::ContainerFlag {
        name,
        managed: true,
        enabled,
    }))
}

async fn set_enabled<S, R>(
    State(monitor): State<Monitor<S, R>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<models::ContainerFlag>>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    let request: models::EnabledRequest = required_body(&body)?;
    monitor.set_managed(&name, request.enabled)?;
    Ok(Json(models::ContainerFlag {
        name,
        managed: true,
        enabled: request.enabled,
    }))
}

fn action_response(outcome: crate::engine::Outcome) -> Response {
    let success = outcome.is_success();
    let status = if success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(models::ActionResponse { success, outcome })).into_response()
}

async fn pause_container<S, R>(
    State(monitor): State<Monitor<S, R>>,
    Path(name): Path<String>,
) -> Result<Response>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    runtime::validate_name(&name)?;
    Ok(action_response(monitor.manual_pause(&name).await))
}

async fn unpause_container<S, R>(
    State(monitor): State<Monitor<S, R>>,
    Path(name): Path<String>,
) -> Result<Response>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    runtime::validate_name(&name)?;
    Ok(action_response(monitor.manual_unpause(&name).await))
}

async fn start_monitor<S, R>(State(monitor): State<Monitor<S, R>>) -> Json<models::MonitorResponse>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    let changed = monitor.start().await;
    Json(models::MonitorResponse {
        running: true,
        changed,
    })
}

async fn stop_monitor<S, R>(State(monitor): State<Monitor<S, R>>) -> Json<models::MonitorResponse>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    let changed = monitor.stop().await;
    Json(models::MonitorResponse {
        running: false,
        changed,
    })
}

fn bulk_response(outcomes: Vec<crate::engine::Outcome>) -> Json<models::BulkActionResponse> {
    Json(models::BulkActionResponse {
        success: outcomes.iter().all(|o| o.is_success()),
        outcomes,
    })
}

async fn pause_all<S, R>(State(monitor): State<Monitor<S, R>>) -> Json<models::BulkActionResponse>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    bulk_response(monitor.pause_all().await)
}

async fn unpause_all<S, R>(State(monitor): State<Monitor<S, R>>) -> Json<models::BulkActionResponse>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    bulk_response(monitor.unpause_all().await)
}

async fn activity<S, R>(
    State(monitor): State<Monitor<S, R>>,
    Query(params): Query<models::ActivityParams>,
) -> Json<Vec<crate::activity::LogEntry>>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    Json(monitor.activity_log(params.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT)))
}

async fn media_sessions<S, R>(
    State(monitor): State<Monitor<S, R>>,
) -> Result<Json<models::SessionsResponse>>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    let sessions = monitor.sessions().await?;
    Ok(Json(models::SessionsResponse {
        active: sessions.iter().filter(|s| s.is_active()).count(),
        sessions,
    }))
}

/// Checks the media server connection, optionally with an unsaved URL or
/// API key from the body.
async fn test_media<S, R>(
    State(monitor): State<Monitor<S, R>>,
    body: Bytes,
) -> Result<Json<models::MediaTestResponse>>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    let request: models::MediaTestRequest = optional_body(&body)?;
    let server = monitor.test_media(request.into()).await?;
    Ok(Json(models::MediaTestResponse {
        success: true,
        server,
    }))
}

async fn test_runtime<S, R>(
    State(monitor): State<Monitor<S, R>>,
) -> Result<Json<models::SuccessResponse>>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    monitor.test_runtime().await?;
    Ok(Json(models::SuccessResponse { success: true }))
}

async fn enable<S, R>(State(monitor): State<Monitor<S, R>>) -> Result<Json<models::SuccessResponse>>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    monitor.set_global_enabled(true)?;
    Ok(Json(models::SuccessResponse { success: true }))
}

async fn disable<S, R>(State(monitor): State<Monitor<S, R>>) -> Result<Json<models::SuccessResponse>>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    monitor.set_global_enabled(false)?;
    Ok(Json(models::SuccessResponse { success: true }))
}

/// Builds the REST router over `monitor`.
pub fn router<S, R>(monitor: Monitor<S, R>) -> axum::Router
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    axum::Router::new()
        .route("/api/status", get(get_status::<S, R>))
        .route(
            "/api/config",
            get(get_config::<S, R>).post(update_config::<S, R>),
        )
        .route("/api/containers", get(discover_containers::<S, R>))
        .route("/api/managed", get(list_managed::<S, R>))
        .route("/api/containers/{name}/manage", post(manage::<S, R>))
        .route("/api/containers/{name}/unmanage", post(unmanage::<S, R>))
        .route("/api/containers/{name}/toggle", post(toggle::<S, R>))
        .route("/api/containers/{name}/enabled", post(set_enabled::<S, R>))
        .route("/api/containers/{name}/pause", post(pause_container::<S, R>))
        .route(
            "/api/containers/{name}/unpause",
            post(unpause_container::<S, R>),
        )
        .route("/api/monitor/start", post(start_monitor::<S, R>))
        .route("/api/monitor/stop", post(stop_monitor::<S, R>))
        .route("/api/monitor/pause-all", post(pause_all::<S, R>))
        .route("/api/monitor/unpause-all", post(unpause_all::<S, R>))
        .route("/api/activity", get(activity::<S, R>))
        .route("/api/media/sessions", get(media_sessions::<S, R>))
        .route("/api/media/test", post(test_media::<S, R>))
        .route("/api/runtime/test", post(test_runtime::<S, R>))
        .route("/api/enable", post(enable::<S, R>))
        .route("/api/disable", post(disable::<S, R>))
        .with_state(monitor)
}

pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new<S, R>(monitor: Monitor<S, R>) -> Self
    where
        S: SessionSource + 'static,
        R: ContainerRuntime + 'static,
    {
        Self {
            router: router(monitor),
        }
    }

    /// Serves the API until the process exits.
    ///
    /// # Errors
    ///
    /// Returns an error if binding `addr` fails.
    pub async fn listen(self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("API listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router).await
    }
}
