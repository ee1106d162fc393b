//! Reconciliation engine: the pause/unpause state machine.
//!
//! Once per tick the engine receives the result of the session fetch and a
//! snapshot of the managed containers, and moves every enabled container
//! towards its target state:
//!
//! - sessions active and container `Running` → pause → `Paused`
//! - no session active and container `Paused` → unpause → `Running`
//! - container `Error` → inspect only; the observed state is adopted and
//!   normal transitions resume on the following tick
//! - container `Unknown` → inspect, adopt, then transition in the same tick
//!
//! A failed session fetch makes the whole pass a no-op (fail closed): no
//! container is paused or unpaused on missing data. Runtime failures are
//! isolated to the container they happened on, which moves to `Error`.
mod state;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::activity::{ActivityLog, LogAction};
use crate::media::{self, Session};
use crate::runtime::{self, Action, ContainerRuntime, Transition};

pub use state::{ContainerState, ManagedContainer, Outcome, Pass};

/// Default upper bound for a single runtime call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Engine<R> {
    runtime: Arc<R>,
    states: Arc<DashMap<String, ContainerState>>,
    log: Arc<ActivityLog>,
    call_timeout: Duration,
}

impl<R: ContainerRuntime> Engine<R> {
    pub fn new(runtime: Arc<R>, log: Arc<ActivityLog>) -> Self {
        Self {
            runtime,
            states: Arc::new(DashMap::new()),
            log,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Sets the timeout applied to every individual runtime call.
    pub fn set_call_timeout(&mut self, timeout: Duration) {
        self.call_timeout = timeout;
    }

    /// Shared handle to the state cache, readable without holding the engine.
    pub fn states(&self) -> Arc<DashMap<String, ContainerState>> {
        Arc::clone(&self.states)
    }

    /// Cached state of a managed container; [`ContainerState::Unknown`] if it
    /// has not been observed yet.
    pub fn state(&self, name: &str) -> ContainerState {
        self.states.get(name).map(|s| *s).unwrap_or_default()
    }

    /// Runs one reconciliation pass.
    ///
    /// # Arguments
    ///
    /// * `sessions` - Result of this tick's session fetch. Only sessions that
    ///   are playing count as active.
    /// * `managed` - Snapshot of the managed containers taken at tick start.
    pub async fn reconcile(
        &self,
        sessions: &media::Result<Vec<Session>>,
        managed: &[ManagedContainer],
    ) -> Pass {
        self.forget_unmanaged(managed);

        let active = match sessions {
            Ok(sessions) => sessions.iter().filter(|s| s.is_active()).count(),
            Err(err) => {
                log::warn!("Skipping reconciliation, session fetch failed: {err}");
                self.log.record(
                    None,
                    LogAction::Error,
                    format!("session fetch failed: {err}"),
                );
                return Pass::default();
            }
        };

        let active_now = active > 0;
        log::debug!("{active} active session(s), reconciling {} container(s)", managed.len());
        let mut outcomes = Vec::new();
        for container in managed.iter().filter(|c| c.enabled) {
            self.step(&container.name, active_now, &mut outcomes).await;
        }

        Pass {
            active_sessions: Some(active),
            outcomes,
        }
    }

    /// Applies `action` to every enabled container regardless of sessions and
    /// of the cached state.
    pub async fn force(&self, action: Action, managed: &[ManagedContainer]) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        for container in managed.iter().filter(|c| c.enabled) {
            outcomes.push(self.apply(&container.name, action, true).await);
        }
        outcomes
    }

    /// Applies `action` to a single container. The cached state is only
    /// updated when the container is `managed`.
    pub async fn apply_one(&self, name: &str, action: Action, managed: bool) -> Outcome {
        self.apply(name, action, managed).await
    }

    async fn step(&self, name: &str, active_now: bool, outcomes: &mut Vec<Outcome>) {
        let mut state = self.state(name);
        match state {
            ContainerState::Error => {
                outcomes.extend(self.resync(name, state).await);
                return;
            }
            ContainerState::Unknown | ContainerState::Unmanaged => {
                outcomes.extend(self.resync(name, state).await);
                state = self.state(name);
            }
            ContainerState::Running | ContainerState::Paused => {}
        }

        let action = match (active_now, state) {
            (true, ContainerState::Running) => Action::Pause,
            (false, ContainerState::Paused) => Action::Unpause,
            _ => return,
        };
        outcomes.push(self.apply(name, action, true).await);
    }

    /// Inspects `name` and adopts the observed state.
    ///
    /// Returns `None` when a container already in `Error` stays there, so an
    /// unavailable container does not log the same failure every tick.
    async fn resync(&self, name: &str, from: ContainerState) -> Option<Outcome> {
        let observed = self
            .call(name, "inspection", self.runtime.inspect_state(name))
            .await;
        let (to, action, detail) = match observed {
            Ok(state) => match ContainerState::from_runtime(state) {
                Some(to) => (to, LogAction::Resync, format!("`{name}` is {state}")),
                None => (
                    ContainerState::Error,
                    LogAction::Error,
                    format!("`{name}` is {state}"),
                ),
            },
            Err(err) => (ContainerState::Error, LogAction::Error, err.to_string()),
        };
        self.states.insert(name.to_owned(), to);

        if from == ContainerState::Error && to == ContainerState::Error {
            log::debug!("container `{name}` is still unavailable: {detail}");
            return None;
        }
        Some(self.record(name, action, from, to, detail))
    }

    async fn apply(&self, name: &str, action: Action, track: bool) -> Outcome {
        let from = if track {
            self.state(name)
        } else {
            ContainerState::Unmanaged
        };
        let result = self
            .call(name, action.as_str(), self.runtime.apply(name, action))
            .await;

        let (to, log_action, detail) = match result {
            Ok(Transition::Applied) => (
                ContainerState::after(action),
                match action {
                    Action::Pause => LogAction::Pause,
                    Action::Unpause => LogAction::Unpause,
                },
                format!("{action}d `{name}`"),
            ),
            Ok(Transition::AlreadyInState) => (
                ContainerState::after(action),
                LogAction::Skip,
                format!("`{name}` is already {}", action.target()),
            ),
            Err(err) => (
                ContainerState::Error,
                LogAction::Error,
                format!("failed to {action} `{name}`: {err}"),
            ),
        };

        let to = if track {
            self.states.insert(name.to_owned(), to);
            to
        } else {
            ContainerState::Unmanaged
        };
        self.record(name, log_action, from, to, detail)
    }

    /// Runs a runtime call under the per-call timeout.
    async fn call<T>(
        &self,
        name: &str,
        operation: &'static str,
        call: impl Future<Output = runtime::Result<T>>,
    ) -> runtime::Result<T> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(runtime::Error::Timeout {
                name: name.to_owned(),
                operation,
                timeout: self.call_timeout,
            }),
        }
    }

    fn record(
        &self,
        name: &str,
        action: LogAction,
        from: ContainerState,
        to: ContainerState,
        detail: String,
    ) -> Outcome {
        if action == LogAction::Error {
            log::warn!("{detail}");
        } else {
            log::info!("{detail}");
        }
        self.log.record(Some(name), action, detail.clone());
        Outcome {
            container: name.to_owned(),
            action,
            from,
            to,
            detail,
        }
    }

    fn forget_unmanaged(&self, managed: &[ManagedContainer]) {
        self.states
            .retain(|name, _| managed.iter().any(|c| c.name == *name));
    }
}
