//! Monitor supervisor: owns the poll loop and the control surface.
//!
//! A single background task ticks on the configured interval. Every pass,
//! scheduled or manual, runs under one async mutex around the [`Engine`], so
//! at most one pass executes at a time and a manual override that arrives
//! mid-tick waits for the tick to finish.
mod status;

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use dashmap::DashMap;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::activity::{ActivityLog, LogAction, LogEntry, unix_timestamp};
use crate::config::{self, ConfigStore, SettingsPatch};
use crate::engine::{ContainerState, Engine, Outcome, Pass};
use crate::media::{self, ServerInfo, Session, SessionSource};
use crate::runtime::{self, Action, ContainerRuntime};

pub use status::{DiscoveredContainer, ManagedContainerStatus, MonitorStatus};

pub struct Monitor<S, R> {
    inner: Arc<Inner<S, R>>,
}

impl<S, R> Clone for Monitor<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S, R> {
    config: Arc<ConfigStore>,
    sessions: S,
    runtime: Arc<R>,
    engine: Mutex<Engine<R>>,
    /// Read side of the engine's state cache; never blocks on a running pass.
    states: Arc<DashMap<String, ContainerState>>,
    log: Arc<ActivityLog>,
    status: RwLock<MonitorStatus>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl<S, R> Monitor<S, R>
where
    S: SessionSource + 'static,
    R: ContainerRuntime + 'static,
{
    pub fn new(config: Arc<ConfigStore>, sessions: S, runtime: R) -> Self {
        let runtime = Arc::new(runtime);
        let log = Arc::new(ActivityLog::default());
        let mut engine = Engine::new(Arc::clone(&runtime), Arc::clone(&log));
        engine.set_call_timeout(config.snapshot().runtime_timeout());
        let states = engine.states();

        Self {
            inner: Arc::new(Inner {
                config,
                sessions,
                runtime,
                engine: Mutex::new(engine),
                states,
                log,
                status: RwLock::new(MonitorStatus::default()),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.inner.config
    }

    /// Starts the poll loop; the first tick runs immediately.
    ///
    /// Returns `false` if the loop was already running.
    pub async fn start(&self) -> bool {
        let mut worker = self.inner.worker.lock().await;
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            log::debug!("Monitor already running");
            return false;
        }

        let (stop, stop_rx) = watch::channel(false);
        let monitor = self.clone();
        let handle = tokio::spawn(async move { monitor.run_loop(stop_rx).await });
        *worker = Some(Worker { stop, handle });

        self.status_mut().running = true;
        let interval = self.inner.config.snapshot().check_interval();
        log::info!("Monitor started, checking every {}s", interval.as_secs());
        self.inner.log.record(
            None,
            LogAction::Started,
            format!("monitor started, checking every {}s", interval.as_secs()),
        );
        true
    }

    /// Stops the poll loop. A tick in progress runs to completion first.
    ///
    /// Returns `false` if the loop was not running.
    pub async fn stop(&self) -> bool {
        let mut worker = self.inner.worker.lock().await;
        let Some(Worker { stop, handle }) = worker.take() else {
            return false;
        };
        stop.send_replace(true);
        if let Err(err) = handle.await {
            log::error!("Monitor task failed: {err}");
        }

        self.status_mut().running = false;
        log::info!("Monitor stopped");
        self.inner
            .log
            .record(None, LogAction::Stopped, "monitor stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.status().running
    }

    async fn run_loop(&self, mut stop: watch::Receiver<bool>) {
        loop {
            self.tick().await;
            // Re-read so that interval changes apply without a restart.
            let interval = self.inner.config.snapshot().check_interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop.changed() => break,
            }
        }
        log::debug!("Monitor loop exited");
    }

    /// Runs one reconciliation pass against a fresh configuration snapshot.
    ///
    /// Returns `None` when monitoring is globally disabled.
    pub async fn tick(&self) -> Option<Pass> {
        let mut engine = self.inner.engine.lock().await;
        let settings = self.inner.config.snapshot();
        if !settings.enabled {
            log::debug!("Monitoring disabled, skipping tick");
            return None;
        }
        engine.set_call_timeout(settings.runtime_timeout());

        let sessions = self
            .inner
            .sessions
            .fetch_sessions(&settings.endpoint())
            .await;
        let pass = engine
            .reconcile(&sessions, &settings.managed_containers())
            .await;

        let errored = self
            .inner
            .states
            .iter()
            .filter(|entry| *entry.value() == ContainerState::Error)
            .count();

        let mut status = self.status_mut();
        status.last_poll = Some(unix_timestamp());
        status.errored_containers = errored;
        match (&sessions, pass.active_sessions) {
            (Err(err), _) => status.last_error = Some(err.to_string()),
            (Ok(_), active) => {
                let active = active.unwrap_or_default();
                status.active_sessions = active;
                status.sessions_active = active > 0;
                // Containers stuck in `Error` produce no outcome after their first failure.
                status.last_error = pass
                    .outcomes
                    .iter()
                    .rev()
                    .find(|o| !o.is_success())
                    .map(|o| o.detail.clone())
                    .or_else(|| {
                        (errored > 0).then(|| format!("{errored} container(s) in error state"))
                    });
            }
        }
        note_last_action(&mut status, &pass.outcomes);
        drop(status);

        Some(pass)
    }

    /// Pauses every enabled managed container, ignoring sessions.
    pub async fn pause_all(&self) -> Vec<Outcome> {
        self.force(Action::Pause).await
    }

    /// Unpauses every enabled managed container, ignoring sessions.
    pub async fn unpause_all(&self) -> Vec<Outcome> {
        self.force(Action::Unpause).await
    }

    async fn force(&self, action: Action) -> Vec<Outcome> {
        let mut engine = self.inner.engine.lock().await;
        let settings = self.inner.config.snapshot();
        engine.set_call_timeout(settings.runtime_timeout());
        log::info!("Manual {action} of all managed containers");

        let outcomes = engine.force(action, &settings.managed_containers()).await;
        note_last_action(&mut self.status_mut(), &outcomes);
        outcomes
    }

    pub async fn manual_pause(&self, name: &str) -> Outcome {
        self.manual(name, Action::Pause).await
    }

    pub async fn manual_unpause(&self, name: &str) -> Outcome {
        self.manual(name, Action::Unpause).await
    }

    async fn manual(&self, name: &str, action: Action) -> Outcome {
        let engine = self.inner.engine.lock().await;
        let managed = self.inner.config.container(name).is_some();
        let outcome = engine.apply_one(name, action, managed).await;
        note_last_action(&mut self.status_mut(), std::slice::from_ref(&outcome));
        outcome
    }

    pub fn status(&self) -> MonitorStatus {
        self.inner
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Managed containers with their last-known state, in name order.
    pub fn list_managed_containers(&self) -> Vec<ManagedContainerStatus> {
        self.inner
            .config
            .snapshot()
            .containers
            .into_iter()
            .map(|(name, settings)| ManagedContainerStatus {
                state: self.container_state(&name),
                name,
                enabled: settings.enabled,
                description: settings.description,
            })
            .collect()
    }

    /// Cached state of `name`; [`ContainerState::Unmanaged`] if it is not
    /// managed.
    pub fn container_state(&self, name: &str) -> ContainerState {
        if self.inner.config.container(name).is_none() {
            return ContainerState::Unmanaged;
        }
        self.inner
            .states
            .get(name)
            .map(|s| *s)
            .unwrap_or_default()
    }

    /// Sets the enabled flag of `name`, managing it first if needed.
    pub fn set_managed(&self, name: &str, enabled: bool) -> config::Result<()> {
        self.inner.config.manage(name, enabled, None)?;
        log::info!(
            "Container `{name}` {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    pub fn manage(&self, name: &str, enabled: bool, description: Option<String>) -> config::Result<()> {
        self.inner.config.manage(name, enabled, description)?;
        log::info!("Managing container `{name}`");
        Ok(())
    }

    /// Removes `name` from management; returns whether it was managed.
    pub fn unmanage(&self, name: &str) -> config::Result<bool> {
        let removed = self.inner.config.unmanage(name)?;
        self.inner.states.remove(name);
        if removed {
            log::info!("No longer managing container `{name}`");
        }
        Ok(removed)
    }

    /// Flips the enabled flag of `name` and returns the new value.
    pub fn toggle(&self, name: &str) -> config::Result<bool> {
        let enabled = self.inner.config.toggle_container(name)?;
        log::info!(
            "Container `{name}` {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(enabled)
    }

    pub fn set_global_enabled(&self, enabled: bool) -> config::Result<()> {
        self.inner.config.set_global_enabled(enabled)?;
        log::info!(
            "Monitoring {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// The `limit` most recent activity entries, newest first.
    pub fn activity_log(&self, limit: usize) -> Vec<LogEntry> {
        self.inner.log.recent(limit)
    }

    /// Every session the media server currently reports.
    pub async fn sessions(&self) -> media::Result<Vec<Session>> {
        let endpoint = self.inner.config.snapshot().endpoint();
        self.inner.sessions.fetch_sessions(&endpoint).await
    }

    /// Queries the media server's info with the stored settings, overridden
    /// by `overrides` without persisting them.
    ///
    /// A masked API key in `overrides` keeps the stored key.
    pub async fn test_media(&self, overrides: SettingsPatch) -> media::Result<ServerInfo> {
        let mut settings = self.inner.config.snapshot();
        overrides.apply(&mut settings);
        self.inner.sessions.server_info(&settings.endpoint()).await
    }

    pub async fn test_runtime(&self) -> runtime::Result<()> {
        let timeout = self.inner.config.snapshot().runtime_timeout();
        bounded(timeout, "/_ping", self.inner.runtime.ping()).await
    }

    /// Every container known to the runtime, joined with its management
    /// settings.
    pub async fn discover_containers(&self) -> runtime::Result<Vec<DiscoveredContainer>> {
        let settings = self.inner.config.snapshot();
        let containers = bounded(
            settings.runtime_timeout(),
            "/containers/json",
            self.inner.runtime.list_containers(),
        )
        .await?;
        Ok(containers
            .into_iter()
            .map(|summary| {
                let managed = settings.containers.get(&summary.name);
                DiscoveredContainer {
                    managed: managed.is_some(),
                    enabled: managed.is_some_and(|c| c.enabled),
                    summary,
                }
            })
            .collect())
    }

    fn status_mut(&self) -> RwLockWriteGuard<'_, MonitorStatus> {
        self.inner
            .status
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn bounded<T>(
    timeout: std::time::Duration,
    path: &str,
    call: impl Future<Output = runtime::Result<T>>,
) -> runtime::Result<T> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| runtime::Error::RequestTimeout {
            path: path.to_owned(),
            timeout,
        })?
}

fn note_last_action(status: &mut MonitorStatus, outcomes: &[Outcome]) {
    if let Some(outcome) = outcomes
        .iter()
        .rev()
        .find(|o| matches!(o.action, LogAction::Pause | LogAction::Unpause))
    {
        status.last_action = Some(outcome.detail.clone());
    }
}
