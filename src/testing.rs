//! In-memory fakes for the media server and the container runtime.
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::media::{self, Endpoint, PlayState, ServerInfo, Session, SessionSource};
use crate::runtime::{
    self, Action, ContainerRuntime, ContainerSummary, RuntimeState, Transition,
};

pub(crate) fn playing_session(id: &str) -> Session {
    Session {
        id: id.to_owned(),
        state: PlayState::Playing,
        item: Some("Severance - Good News About Hell".to_owned()),
        user_name: "alice".to_owned(),
        client: "Jellyfin Web".to_owned(),
        device_name: "Firefox".to_owned(),
    }
}

pub(crate) fn paused_session(id: &str) -> Session {
    Session {
        state: PlayState::Paused,
        ..playing_session(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Call {
    pub op: &'static str,
    pub name: String,
}

/// A container runtime that behaves like Docker on an in-memory table.
#[derive(Default)]
pub(crate) struct FakeRuntime {
    containers: Mutex<HashMap<String, RuntimeState>>,
    failing: Mutex<HashSet<(String, &'static str)>>,
    delays: Mutex<HashMap<String, Duration>>,
    /// Delay of `ping` and `list_containers`.
    engine_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRuntime {
    pub fn with(containers: &[(&str, RuntimeState)]) -> Self {
        let runtime = Self::default();
        for (name, state) in containers {
            runtime.set_state(name, *state);
        }
        runtime
    }

    pub fn set_state(&self, name: &str, state: RuntimeState) {
        self.containers
            .lock()
            .unwrap()
            .insert(name.to_owned(), state);
    }

    pub fn state(&self, name: &str) -> RuntimeState {
        self.containers
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(RuntimeState::Missing)
    }

    /// Makes every `op` ("pause", "unpause" or "inspect") on `name` fail.
    pub fn fail(&self, name: &str, op: &'static str) {
        self.failing.lock().unwrap().insert((name.to_owned(), op));
    }

    pub fn heal(&self, name: &str, op: &'static str) {
        self.failing.lock().unwrap().remove(&(name.to_owned(), op));
    }

    /// Delays every call on `name`.
    pub fn delay(&self, name: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(name.to_owned(), delay);
    }

    /// Delays the engine-wide calls `ping` and `list_containers`.
    pub fn hang_engine(&self, delay: Duration) {
        *self.engine_delay.lock().unwrap() = Some(delay);
    }

    async fn engine_call(&self) {
        let delay = *self.engine_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Container names of all recorded calls of `op`, in call order.
    pub fn calls_of(&self, op: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.op == op)
            .map(|call| call.name.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, op: &'static str, name: &str) -> runtime::Result<()> {
        self.calls.lock().unwrap().push(Call {
            op,
            name: name.to_owned(),
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(&(name.to_owned(), op)) {
            return Err(runtime::Error::Status {
                path: format!("/containers/{name}/{op}"),
                status: 500,
                message: "injected failure".to_owned(),
            });
        }
        Ok(())
    }

    async fn transition(&self, name: &str, action: Action) -> runtime::Result<Transition> {
        self.enter(action.as_str(), name).await?;
        let mut containers = self.containers.lock().unwrap();
        match containers.get_mut(name) {
            None => Err(runtime::Error::NotFound(name.to_owned())),
            Some(state) if *state == action.target() => Ok(Transition::AlreadyInState),
            Some(state) if *state == action.source() => {
                *state = action.target();
                Ok(Transition::Applied)
            }
            Some(state) => Err(runtime::Error::InvalidState {
                name: name.to_owned(),
                action,
                state: *state,
            }),
        }
    }
}

impl ContainerRuntime for FakeRuntime {
    async fn pause(&self, name: &str) -> runtime::Result<Transition> {
        self.transition(name, Action::Pause).await
    }

    async fn unpause(&self, name: &str) -> runtime::Result<Transition> {
        self.transition(name, Action::Unpause).await
    }

    async fn inspect_state(&self, name: &str) -> runtime::Result<RuntimeState> {
        self.enter("inspect", name).await?;
        Ok(self.state(name))
    }

    async fn list_containers(&self) -> runtime::Result<Vec<ContainerSummary>> {
        self.calls.lock().unwrap().push(Call {
            op: "list",
            name: String::new(),
        });
        self.engine_call().await;
        let mut containers: Vec<_> = self
            .containers
            .lock()
            .unwrap()
            .iter()
            .map(|(name, state)| ContainerSummary {
                name: name.clone(),
                id: format!("{:0>12}", name.len()),
                image: format!("lscr.io/linuxserver/{name}:latest"),
                state: *state,
                status: state.to_string(),
            })
            .collect();
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    async fn ping(&self) -> runtime::Result<()> {
        self.engine_call().await;
        Ok(())
    }
}

/// What the next session fetch returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Script {
    Idle,
    Playing(usize),
    Fail,
}

pub(crate) struct FakeSessions {
    script: Mutex<Script>,
    fetches: AtomicUsize,
    last_url: Mutex<Option<String>>,
}

impl FakeSessions {
    pub fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            fetches: AtomicUsize::new(0),
            last_url: Mutex::new(None),
        }
    }

    pub fn set(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Base URL of the last server info request.
    pub fn last_url(&self) -> Option<String> {
        self.last_url.lock().unwrap().clone()
    }

    fn current(&self, endpoint: &Endpoint) -> media::Result<Script> {
        match *self.script.lock().unwrap() {
            Script::Fail => Err(media::Error::Connection {
                url: format!("{}/Sessions", endpoint.base_url),
                reason: "connection refused".to_owned(),
            }),
            script => Ok(script),
        }
    }
}

impl SessionSource for FakeSessions {
    async fn fetch_sessions(&self, endpoint: &Endpoint) -> media::Result<Vec<Session>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.current(endpoint)? {
            Script::Playing(n) => Ok((0..n)
                .map(|i| playing_session(&format!("s{i}")))
                .collect()),
            _ => Ok(vec![paused_session("idle")]),
        }
    }

    async fn server_info(&self, endpoint: &Endpoint) -> media::Result<ServerInfo> {
        *self.last_url.lock().unwrap() = Some(endpoint.base_url.clone());
        if endpoint.api_key.is_empty() {
            return Err(media::Error::Auth("no API key configured".to_owned()));
        }
        self.current(endpoint)?;
        Ok(ServerInfo {
            server_name: "fake".to_owned(),
            version: "10.9.0".to_owned(),
        })
    }
}
