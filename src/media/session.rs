use super::{Error, Result};

/// Playback state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Playing,
    Paused,
    /// Connected without anything loaded, e.g. a client browsing the library.
    Stopped,
}

/// One playback session as reported by the media server.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Session {
    pub id: String,
    pub state: PlayState,
    /// Display name of the item being played, `"Series - Episode"` for episodes.
    pub item: Option<String>,
    pub user_name: String,
    pub client: String,
    pub device_name: String,
}

impl Session {
    /// Whether this session keeps managed containers paused.
    pub fn is_active(&self) -> bool {
        self.state == PlayState::Playing
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSession {
    id: Option<String>,
    user_name: Option<String>,
    client: Option<String>,
    device_name: Option<String>,
    now_playing_item: Option<RawItem>,
    play_state: Option<RawPlayState>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawItem {
    name: Option<String>,
    series_name: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPlayState {
    #[serde(default)]
    is_paused: bool,
}

impl From<RawSession> for Session {
    fn from(raw: RawSession) -> Self {
        let item = raw.now_playing_item.as_ref().map(|item| {
            let name = item.name.as_deref().unwrap_or("Unknown");
            match item.series_name.as_deref() {
                Some(series) if !series.is_empty() => format!("{series} - {name}"),
                _ => name.to_owned(),
            }
        });
        let paused = raw.play_state.as_ref().is_some_and(|ps| ps.is_paused);
        let state = match (&item, paused) {
            (None, _) => PlayState::Stopped,
            (Some(_), true) => PlayState::Paused,
            (Some(_), false) => PlayState::Playing,
        };

        Self {
            id: raw.id.unwrap_or_default(),
            state,
            item,
            user_name: raw.user_name.unwrap_or_else(|| "Unknown".to_owned()),
            client: raw.client.unwrap_or_else(|| "Unknown".to_owned()),
            device_name: raw.device_name.unwrap_or_else(|| "Unknown".to_owned()),
        }
    }
}

/// Parses the body of a `GET /Sessions` response.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the body is not a JSON array of session objects.
pub fn parse_sessions(body: &[u8]) -> Result<Vec<Session>> {
    let raw: Vec<RawSession> = serde_json::from_slice(body).map_err(Error::Parse)?;
    Ok(raw.into_iter().map(Session::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSIONS: &str = r#"[
        {
            "Id": "a1",
            "UserName": "alice",
            "Client": "Jellyfin Web",
            "DeviceName": "Firefox",
            "IsActive": true,
            "NowPlayingItem": {"Name": "Pilot", "SeriesName": "Some Show"},
            "PlayState": {"IsPaused": false, "PositionTicks": 1200}
        },
        {
            "Id": "b2",
            "UserName": "bob",
            "Client": "Android TV",
            "DeviceName": "Living Room",
            "IsActive": true,
            "NowPlayingItem": {"Name": "A Movie"},
            "PlayState": {"IsPaused": true}
        },
        {
            "Id": "c3",
            "UserName": "carol",
            "Client": "Jellyfin Web",
            "DeviceName": "Chrome",
            "IsActive": true,
            "PlayState": {}
        }
    ]"#;

    #[test]
    fn test_parse_sessions_play_states() {
        let sessions = parse_sessions(SESSIONS.as_bytes()).unwrap();
        assert_eq!(sessions.len(), 3);
        assert_eq!(sessions[0].state, PlayState::Playing);
        assert_eq!(sessions[1].state, PlayState::Paused);
        assert_eq!(sessions[2].state, PlayState::Stopped);
    }

    #[test]
    fn test_only_playing_sessions_are_active() {
        let sessions = parse_sessions(SESSIONS.as_bytes()).unwrap();
        let active: Vec<&str> = sessions
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(active, vec!["a1"]);
    }

    #[test]
    fn test_item_name_includes_series() {
        let sessions = parse_sessions(SESSIONS.as_bytes()).unwrap();
        assert_eq!(sessions[0].item.as_deref(), Some("Some Show - Pilot"));
        assert_eq!(sessions[1].item.as_deref(), Some("A Movie"));
        assert_eq!(sessions[2].item, None);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let sessions = parse_sessions(br#"[{"NowPlayingItem": {}}]"#).unwrap();
        let session = &sessions[0];
        assert_eq!(session.id, "");
        assert_eq!(session.user_name, "Unknown");
        assert_eq!(session.item.as_deref(), Some("Unknown"));
        assert_eq!(session.state, PlayState::Playing);
    }

    #[test]
    fn test_empty_array() {
        assert!(parse_sessions(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_body() {
        let err = parse_sessions(b"{\"not\": \"an array\"}").unwrap_err();
        assert!(matches!(err, Error::Parse(_)), "unexpected error: {err}");

        let err = parse_sessions(b"<html>").unwrap_err();
        assert!(matches!(err, Error::Parse(_)), "unexpected error: {err}");
    }
}
