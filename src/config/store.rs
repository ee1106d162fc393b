use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use super::{ContainerSettings, Error, Result, Settings, SettingsPatch};
use crate::runtime;

/// Thread-safe owner of the current [`Settings`].
#[derive(Debug)]
pub struct ConfigStore {
    /// `None` for stores that are never persisted.
    path: Option<PathBuf>,
    settings: RwLock<Settings>,
}

impl ConfigStore {
    /// Loads settings from `path`, bootstrapping from the process environment
    /// when the file does not exist yet.
    ///
    /// This never fails: an unreadable or invalid file is logged and replaced
    /// by the defaults, so a broken config cannot keep the service down.
    pub fn load(path: impl AsRef<Path>) -> Self {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load), reading environment variables through `env`.
    ///
    /// Recognized variables: `JELLYFIN_URL`, `JELLYFIN_API_KEY`,
    /// `CHECK_INTERVAL` and `CONTAINERS_TO_PAUSE` (comma or whitespace
    /// separated container names).
    pub fn load_with_env(path: impl AsRef<Path>, env: impl Fn(&str) -> Option<String>) -> Self {
        let path = path.as_ref();
        let exists = path.exists();
        let settings = if exists {
            match read_settings(path) {
                Ok(settings) => {
                    log::info!("Loaded configuration from `{}`", path.display());
                    settings
                }
                Err(err) => {
                    log::warn!("{err}, using defaults");
                    Settings::default()
                }
            }
        } else {
            log::info!(
                "No configuration at `{}`, bootstrapping from environment",
                path.display()
            );
            settings_from_env(env)
        };

        let store = Self::new(Some(path.to_path_buf()), settings);
        if !exists {
            if let Err(err) = write_settings(path, &store.snapshot()) {
                log::warn!("{err}");
            }
        }
        store
    }

    /// A store that lives only in memory.
    pub fn in_memory(settings: Settings) -> Self {
        Self::new(None, settings)
    }

    fn new(path: Option<PathBuf>, mut settings: Settings) -> Self {
        settings.normalize();
        Self {
            path,
            settings: RwLock::new(settings),
        }
    }

    /// Returns a consistent copy of the current settings.
    pub fn snapshot(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies `f` to the settings and persists the result.
    ///
    /// The write lock is held until the file is written, so concurrent
    /// updates reach the disk in the order they were applied. The in-memory
    /// change is kept even if writing the file fails.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or [`Error::Write`] if persisting fails.
    pub fn update<T>(&self, f: impl FnOnce(&mut Settings) -> Result<T>) -> Result<T> {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut *settings)?;
        settings.normalize();
        if let Some(path) = self.path.as_deref() {
            write_settings(path, &settings)?;
        }
        Ok(out)
    }

    pub fn apply_patch(&self, patch: SettingsPatch) -> Result<Settings> {
        self.update(|settings| {
            patch.apply(settings);
            Ok(settings.clone())
        })
    }

    pub fn set_global_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|settings| {
            settings.enabled = enabled;
            Ok(())
        })
    }

    /// Adds `name` to the managed containers, or replaces its settings.
    pub fn manage(&self, name: &str, enabled: bool, description: Option<String>) -> Result<()> {
        runtime::validate_name(name)?;
        self.update(|settings| {
            let entry = settings.containers.entry(name.to_owned()).or_default();
            entry.enabled = enabled;
            if let Some(description) = description {
                entry.description = description;
            }
            Ok(())
        })
    }

    /// Removes `name` from management; returns whether it was managed.
    pub fn unmanage(&self, name: &str) -> Result<bool> {
        self.update(|settings| Ok(settings.containers.remove(name).is_some()))
    }

    /// Flips the enabled flag of `name` and returns the new value.
    pub fn toggle_container(&self, name: &str) -> Result<bool> {
        self.update(|settings| match settings.containers.get_mut(name) {
            Some(container) => {
                container.enabled = !container.enabled;
                Ok(container.enabled)
            }
            None => Err(Error::NotManaged(name.to_owned())),
        })
    }

    pub fn container(&self, name: &str) -> Option<ContainerSettings> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .containers
            .get(name)
            .cloned()
    }
}

/// Writes `settings` to a temporary file next to `path` and renames it into
/// place, so readers never see a partially written file.
fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    let write_error = |source: std::io::Error| Error::Write {
        path: path.to_path_buf(),
        source,
    };
    let json = serde_json::to_vec_pretty(settings).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_error)?;

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;
    file.write_all(&json).map_err(write_error)?;
    file.persist(path).map_err(|err| write_error(err.error))?;
    Ok(())
}

fn read_settings(path: &Path) -> Result<Settings> {
    let raw = std::fs::read(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn settings_from_env(env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();
    if let Some(url) = env("JELLYFIN_URL").filter(|v| !v.is_empty()) {
        settings.jellyfin_url = url;
    }
    if let Some(key) = env("JELLYFIN_API_KEY").filter(|v| !v.is_empty()) {
        settings.jellyfin_api_key = key;
    }
    if let Some(interval) = env("CHECK_INTERVAL") {
        match interval.trim().parse() {
            Ok(secs) => settings.check_interval_secs = secs,
            Err(_) => log::warn!("ignoring invalid CHECK_INTERVAL `{interval}`"),
        }
    }
    if let Some(names) = env("CONTAINERS_TO_PAUSE") {
        for name in names.split(|c: char| c == ',' || c.is_whitespace()) {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if let Err(err) = runtime::validate_name(name) {
                log::warn!("ignoring entry of CONTAINERS_TO_PAUSE: {err}");
                continue;
            }
            settings
                .containers
                .insert(name.to_owned(), ContainerSettings::default());
        }
    }
    settings
}
