use crate::config::SettingsPatch;
use crate::engine::Outcome;
use crate::media::{ServerInfo, Session};
use crate::monitor::MonitorStatus;

#[derive(Debug, serde::Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: MonitorStatus,
    /// Global switch from the configuration.
    pub enabled: bool,
    pub check_interval_secs: u64,
    pub jellyfin_url: String,
    pub api_key_configured: bool,
    pub managed_containers: usize,
}

/// Body of `POST /api/containers/{name}/manage`; may be omitted.
#[derive(Debug, serde::Deserialize)]
pub struct ManageRequest {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl Default for ManageRequest {
    fn default() -> Self {
        Self {
            enabled: true,
            description: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, serde::Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

#[derive(Debug, serde::Deserialize)]
pub struct ActivityParams {
    pub limit: Option<usize>,
}

#[derive(Debug, serde::Serialize)]
pub struct ContainerFlag {
    pub name: String,
    pub managed: bool,
    pub enabled: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, serde::Serialize)]
pub struct BulkActionResponse {
    /// `true` only if every container succeeded.
    pub success: bool,
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, serde::Serialize)]
pub struct MonitorResponse {
    pub running: bool,
    /// Whether the request changed anything.
    pub changed: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct SessionsResponse {
    pub active: usize,
    pub sessions: Vec<Session>,
}

/// Body of `POST /api/media/test`; unset fields use the stored settings.
#[derive(Debug, Default, serde::Deserialize)]
pub struct MediaTestRequest {
    #[serde(default, alias = "jellyfin_url")]
    pub url: Option<String>,
    #[serde(default, alias = "jellyfin_api_key")]
    pub api_key: Option<String>,
}

impl From<MediaTestRequest> for SettingsPatch {
    fn from(request: MediaTestRequest) -> Self {
        SettingsPatch {
            jellyfin_url: request.url,
            jellyfin_api_key: request.api_key,
            ..SettingsPatch::default()
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct MediaTestResponse {
    pub success: bool,
    pub server: ServerInfo,
}

#[derive(Debug, serde::Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
