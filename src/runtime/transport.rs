use std::path::PathBuf;
use std::time::Duration;

use http_body_util::{BodyExt, Empty};
use hyper::Method;
use hyper::body::Bytes;
use hyper::header::HOST;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;

use super::{Error, Result};

/// HTTP/1.1 over a unix domain socket.
///
/// Every request opens its own connection; the engine API is cheap to connect
/// to and calls are infrequent, so there is no pool to keep healthy.
#[derive(Debug, Clone)]
pub(super) struct UnixTransport {
    path: PathBuf,
    /// Upper bound for one request, from connect to the last body byte.
    timeout: Duration,
}

impl UnixTransport {
    pub(super) fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub(super) fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Sends a body-less request to `uri` (a path with optional query) and
    /// returns the status code together with the full response body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RequestTimeout`] if the engine accepts the connection
    /// but does not answer in time.
    pub(super) async fn send(&self, method: Method, uri: &str) -> Result<(StatusCode, Bytes)> {
        match tokio::time::timeout(self.timeout, self.exchange(method, uri)).await {
            Ok(result) => result,
            Err(_) => Err(Error::RequestTimeout {
                path: uri.to_owned(),
                timeout: self.timeout,
            }),
        }
    }

    async fn exchange(&self, method: Method, uri: &str) -> Result<(StatusCode, Bytes)> {
        log::trace!("{} {} via {}", method, uri, self.path.display());
        let stream = tokio::net::UnixStream::connect(&self.path)
            .await
            .map_err(|source| Error::SocketConnect {
                path: self.path.clone(),
                source,
            })?;

        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(Error::Transport)?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                log::debug!("container engine connection closed with error: {err}");
            }
        });

        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(HOST, "localhost")
            .body(Empty::<Bytes>::new())
            .map_err(Error::Request)?;
        let response = sender.send_request(request).await.map_err(Error::Transport)?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(Error::Transport)?
            .to_bytes();

        Ok((status, body))
    }
}
