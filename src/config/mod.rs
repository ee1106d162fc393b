//! Process-wide settings and their JSON persistence.
//!
//! [`ConfigStore`] owns the current [`Settings`] behind a lock. Readers take a
//! cloned snapshot ([`ConfigStore::snapshot`]) so that one reconciliation pass
//! works on a consistent view, while every mutation is written back to the
//! config file and becomes visible to the next pass.
mod error;
mod store;

use std::collections::BTreeMap;
use std::time::Duration;

pub use error::{Error, Result};
pub use store::ConfigStore;

use crate::engine::ManagedContainer;
use crate::media::Endpoint;

pub const DEFAULT_CONFIG_PATH: &str = "/config/config.json";
pub const DEFAULT_JELLYFIN_URL: &str = "http://localhost:8096";
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;
/// Lower bound for the poll interval, to avoid hammering the media server.
pub const MIN_CHECK_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RUNTIME_TIMEOUT_SECS: u64 = 10;

/// Placeholder returned instead of the API key when settings are displayed.
pub const MASKED_API_KEY: &str = "********";

/// Per-container management settings.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContainerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            description: String::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    pub jellyfin_url: String,
    pub jellyfin_api_key: String,
    #[serde(alias = "check_interval")]
    pub check_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub runtime_timeout_secs: u64,
    /// Global switch; while off, ticks do nothing.
    pub enabled: bool,
    pub containers: BTreeMap<String, ContainerSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jellyfin_url: DEFAULT_JELLYFIN_URL.to_owned(),
            jellyfin_api_key: String::new(),
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            runtime_timeout_secs: DEFAULT_RUNTIME_TIMEOUT_SECS,
            enabled: true,
            containers: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Raises out-of-range values to their floors.
    pub fn normalize(&mut self) {
        if self.check_interval_secs < MIN_CHECK_INTERVAL_SECS {
            log::warn!(
                "check interval of {}s is below the minimum, using {}s",
                self.check_interval_secs,
                MIN_CHECK_INTERVAL_SECS
            );
            self.check_interval_secs = MIN_CHECK_INTERVAL_SECS;
        }
        self.request_timeout_secs = self.request_timeout_secs.max(1);
        self.runtime_timeout_secs = self.runtime_timeout_secs.max(1);
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(MIN_CHECK_INTERVAL_SECS))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn runtime_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime_timeout_secs.max(1))
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(
            self.jellyfin_url.clone(),
            self.jellyfin_api_key.clone(),
            self.request_timeout(),
        )
    }

    pub fn has_api_key(&self) -> bool {
        !self.jellyfin_api_key.trim().is_empty()
    }

    /// The managed containers in name order.
    pub fn managed_containers(&self) -> Vec<ManagedContainer> {
        self.containers
            .iter()
            .map(|(name, c)| ManagedContainer {
                name: name.clone(),
                enabled: c.enabled,
            })
            .collect()
    }

    /// A copy safe to display: the API key is replaced by [`MASKED_API_KEY`].
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        if masked.has_api_key() {
            masked.jellyfin_api_key = MASKED_API_KEY.to_owned();
        }
        masked
    }
}

/// A partial update of [`Settings`], as sent by the REST surface.
///
/// Absent fields are left untouched. An API key equal to [`MASKED_API_KEY`]
/// is the masked value echoed back and keeps the stored key.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct SettingsPatch {
    pub jellyfin_url: Option<String>,
    pub jellyfin_api_key: Option<String>,
    #[serde(alias = "check_interval")]
    pub check_interval_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub runtime_timeout_secs: Option<u64>,
    pub enabled: Option<bool>,
}

impl SettingsPatch {
    pub fn apply(self, settings: &mut Settings) {
        if let Some(url) = self.jellyfin_url {
            settings.jellyfin_url = url;
        }
        if let Some(key) = self.jellyfin_api_key.filter(|k| k != MASKED_API_KEY) {
            settings.jellyfin_api_key = key;
        }
        if let Some(secs) = self.check_interval_secs {
            settings.check_interval_secs = secs;
        }
        if let Some(secs) = self.request_timeout_secs {
            settings.request_timeout_secs = secs;
        }
        if let Some(secs) = self.runtime_timeout_secs {
            settings.runtime_timeout_secs = secs;
        }
        if let Some(enabled) = self.enabled {
            settings.enabled = enabled;
        }
        settings.normalize();
    }
}
