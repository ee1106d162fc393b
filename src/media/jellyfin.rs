use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;

use super::{Error, Result, Session, SessionSource, parse_sessions};

const USER_AGENT: &str = concat!("pausarr/", env!("CARGO_PKG_VERSION"));

/// Where and how to reach the media server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub api_key: String,
    /// Upper bound for a single request, including reading the body.
    pub timeout: Duration,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorization(&self) -> String {
        format!("MediaBrowser Token=\"{}\"", self.api_key)
    }
}

/// Identity of the media server, as returned by `GET /System/Info`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServerInfo {
    #[serde(rename = "ServerName", default = "default_server_name")]
    pub server_name: String,
    #[serde(rename = "Version", default = "default_version")]
    pub version: String,
}

fn default_server_name() -> String {
    "Jellyfin".to_owned()
}

fn default_version() -> String {
    "unknown".to_owned()
}

/// [`SessionSource`] talking to the Jellyfin HTTP API.
#[derive(Debug, Clone)]
pub struct JellyfinClient {
    http: reqwest::Client,
}

impl JellyfinClient {
    /// Creates a client with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Client`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::Client)?;
        Ok(Self { http })
    }

    async fn get(&self, endpoint: &Endpoint, path: &str) -> Result<Vec<u8>> {
        if endpoint.api_key.trim().is_empty() {
            return Err(Error::Auth("API key not configured".to_owned()));
        }

        let url = endpoint.url(path);
        log::trace!("GET {url}");
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, endpoint.authorization())
            .timeout(endpoint.timeout)
            .send()
            .await
            .map_err(|err| connection_error(&url, endpoint.timeout, err))?;

        match response.status() {
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                return Err(Error::Auth(format!(
                    "API key rejected (HTTP {})",
                    status.as_u16()
                )));
            }
            status if !status.is_success() => {
                return Err(Error::Connection {
                    url,
                    reason: format!("HTTP {}", status.as_u16()),
                });
            }
            _ => {}
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| connection_error(&url, endpoint.timeout, err))?;
        Ok(body.to_vec())
    }
}

fn connection_error(url: &str, timeout: Duration, err: reqwest::Error) -> Error {
    let reason = if err.is_timeout() {
        format!("timed out after {}s", timeout.as_secs_f32())
    } else {
        err.to_string()
    };
    Error::Connection {
        url: url.to_owned(),
        reason,
    }
}

impl SessionSource for JellyfinClient {
    async fn fetch_sessions(&self, endpoint: &Endpoint) -> Result<Vec<Session>> {
        let body = self.get(endpoint, "Sessions").await?;
        parse_sessions(&body)
    }

    async fn server_info(&self, endpoint: &Endpoint) -> Result<ServerInfo> {
        let body = self.get(endpoint, "System/Info").await?;
        serde_json::from_slice(&body).map_err(Error::Parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::get;

    const TOKEN: &str = "secret";

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("MediaBrowser Token=\"{TOKEN}\""))
    }

    async fn sessions(headers: HeaderMap) -> axum::response::Response {
        if !authorized(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        (
            StatusCode::OK,
            r#"[
                {"Id": "1", "NowPlayingItem": {"Name": "Movie"}, "PlayState": {"IsPaused": false}},
                {"Id": "2", "NowPlayingItem": {"Name": "Other"}, "PlayState": {"IsPaused": true}},
                {"Id": "3"}
            ]"#,
        )
            .into_response()
    }

    async fn system_info(headers: HeaderMap) -> axum::response::Response {
        if !authorized(&headers) {
            return StatusCode::FORBIDDEN.into_response();
        }
        (
            StatusCode::OK,
            r#"{"ServerName": "den", "Version": "10.9.11", "Id": "x"}"#,
        )
            .into_response()
    }

    async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}/")
    }

    async fn fake_server() -> String {
        serve(
            axum::Router::new()
                .route("/Sessions", get(sessions))
                .route("/System/Info", get(system_info)),
        )
        .await
    }

    fn endpoint(base_url: &str, api_key: &str) -> Endpoint {
        Endpoint::new(base_url, api_key, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_fetch_sessions_and_active_filter() {
        let base = fake_server().await;
        let client = JellyfinClient::new().unwrap();

        let all = client.fetch_sessions(&endpoint(&base, TOKEN)).await.unwrap();
        assert_eq!(all.len(), 3);

        let active = client
            .fetch_active_sessions(&endpoint(&base, TOKEN))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "1");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_auth_error() {
        let client = JellyfinClient::new().unwrap();
        // Unroutable on purpose: no request must be made without a key.
        let err = client
            .fetch_sessions(&endpoint("http://192.0.2.1:8096", "  "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_rejected_api_key_is_auth_error() {
        let base = fake_server().await;
        let client = JellyfinClient::new().unwrap();

        let err = client
            .fetch_sessions(&endpoint(&base, "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)), "unexpected error: {err}");

        let err = client
            .server_info(&endpoint(&base, "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_server_error_is_connection_error() {
        let base = serve(axum::Router::new().route(
            "/Sessions",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        ))
        .await;
        let client = JellyfinClient::new().unwrap();

        let err = client
            .fetch_sessions(&endpoint(&base, TOKEN))
            .await
            .unwrap_err();
        match err {
            Error::Connection { reason, .. } => assert_eq!(reason, "HTTP 500"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let base = serve(axum::Router::new().route("/Sessions", get(|| async { "not json" }))).await;
        let client = JellyfinClient::new().unwrap();

        let err = client
            .fetch_sessions(&endpoint(&base, TOKEN))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_timeout_is_connection_error() {
        let base = serve(axum::Router::new().route(
            "/Sessions",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "[]"
            }),
        ))
        .await;
        let client = JellyfinClient::new().unwrap();
        let endpoint = Endpoint::new(base, TOKEN, Duration::from_millis(100));

        let err = client.fetch_sessions(&endpoint).await.unwrap_err();
        match err {
            Error::Connection { reason, .. } => assert!(reason.contains("timed out"), "{reason}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = JellyfinClient::new().unwrap();

        let err = client
            .fetch_sessions(&endpoint(&format!("http://{addr}"), TOKEN))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection { .. }), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_server_info() {
        let base = fake_server().await;
        let client = JellyfinClient::new().unwrap();

        let info = client.server_info(&endpoint(&base, TOKEN)).await.unwrap();
        assert_eq!(
            info,
            ServerInfo {
                server_name: "den".to_owned(),
                version: "10.9.11".to_owned(),
            }
        );
    }

    #[test]
    fn test_endpoint_url_ignores_trailing_slash() {
        let a = endpoint("http://jf:8096/", TOKEN);
        let b = endpoint("http://jf:8096", TOKEN);
        assert_eq!(a.url("Sessions"), "http://jf:8096/Sessions");
        assert_eq!(a.url("Sessions"), b.url("Sessions"));
    }
}
