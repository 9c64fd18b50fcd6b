//! Control channel to a running nydusd
//!
//! nydusd serves a small HTTP API on its unix socket. The manager only needs
//! three calls from it: a status probe, and mount/unmount of a virtual
//! filesystem inside the shared daemon.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use tokio::net::UnixStream;

use super::{Daemon, DaemonError, DaemonInfo};

const DAEMON_ENDPOINT: &str = "/api/v1/daemon";
const MOUNT_ENDPOINT: &str = "/api/v1/mount";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] hyper::Error),
    #[error("invalid request: {0}")]
    Request(#[from] http::Error),
    #[error("daemon api returned {status}: {code} {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("daemon error: {0}")]
    Daemon(#[from] DaemonError),
}

/// Operations the manager issues against a daemon's control channel
#[async_trait]
pub trait DaemonApi: Send + Sync + std::fmt::Debug {
    /// Probe the daemon; any error means it is not reachable.
    async fn check_status(&self, daemon: &Daemon) -> Result<DaemonInfo, ClientError>;

    /// Ask the shared daemon to mount `daemon`'s bootstrap at its mountpoint.
    async fn shared_mount(&self, daemon: &Daemon) -> Result<(), ClientError>;

    /// Ask the shared daemon to drop `daemon`'s mountpoint.
    async fn shared_umount(&self, daemon: &Daemon) -> Result<(), ClientError>;
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct MountRequest<'a> {
    source: &'a str,
    fs_type: &'a str,
    config: &'a str,
}

/// HTTP-over-unix-socket client for the nydusd API
#[derive(Debug, Clone, Default)]
pub struct NydusdClient;

impl NydusdClient {
    pub fn new() -> Self {
        Self
    }

    async fn send(
        &self,
        sock: &Path,
        method: Method,
        path_and_query: &str,
        body: Option<Bytes>,
    ) -> Result<Bytes, ClientError> {
        let stream = UnixStream::connect(sock).await?;
        let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "daemon api connection closed with error");
            }
        });

        let mut builder = Request::builder()
            .method(method)
            .uri(path_and_query)
            .header(header::HOST, "localhost");
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder.body(Full::new(body.unwrap_or_default()))?;

        let response = sender.send_request(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();

        if status.is_success() {
            return Ok(bytes);
        }
        let err = serde_json::from_slice::<ApiErrorBody>(&bytes).unwrap_or_else(|_| ApiErrorBody {
            code: String::new(),
            message: String::from_utf8_lossy(&bytes).into_owned(),
        });
        Err(ClientError::Api {
            status,
            code: err.code,
            message: err.message,
        })
    }
}

fn mount_query(mount_point: &Path) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("mountpoint", &mount_point.to_string_lossy())
        .finish();
    format!("{}?{}", MOUNT_ENDPOINT, query)
}

#[async_trait]
impl DaemonApi for NydusdClient {
    async fn check_status(&self, daemon: &Daemon) -> Result<DaemonInfo, ClientError> {
        let body = self
            .send(&daemon.api_sock(), Method::GET, DAEMON_ENDPOINT, None)
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn shared_mount(&self, daemon: &Daemon) -> Result<(), ClientError> {
        let bootstrap = daemon.bootstrap_file()?;
        let config = tokio::fs::read_to_string(daemon.config_file()).await?;
        let body = serde_json::to_vec(&MountRequest {
            source: &bootstrap.to_string_lossy(),
            fs_type: "rafs",
            config: &config,
        })?;
        self.send(
            &daemon.api_sock(),
            Method::POST,
            &mount_query(&daemon.mount_point()),
            Some(Bytes::from(body)),
        )
        .await?;
        Ok(())
    }

    async fn shared_umount(&self, daemon: &Daemon) -> Result<(), ClientError> {
        self.send(
            &daemon.api_sock(),
            Method::DELETE,
            &mount_query(&daemon.mount_point()),
            None,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::DaemonState;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;
    use tokio::sync::oneshot;

    /// Serve a single canned response and hand back the raw request.
    fn serve_once(
        sock: &Path,
        status_line: &'static str,
        body: &'static str,
    ) -> oneshot::Receiver<String> {
        let listener = UnixListener::bind(sock).unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                if n == 0 || raw.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let head = String::from_utf8_lossy(&raw).to_string();
            let content_length = head
                .lines()
                .find_map(|l| {
                    let lower = l.to_ascii_lowercase();
                    lower
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap())
                })
                .unwrap_or(0);
            let header_end = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
            while raw.len() < header_end + content_length {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&raw).to_string());
        });
        rx
    }

    fn daemon_at(dir: &Path) -> Daemon {
        Daemon::with_id("d1", "snap1")
            .socket_dir(dir)
            .config_dir(dir)
            .snapshot_dir(dir.join("snapshots"))
    }

    #[tokio::test]
    async fn test_check_status() {
        let temp = tempfile::tempdir().unwrap();
        let d = daemon_at(temp.path());
        std::fs::create_dir_all(&d.socket_dir).unwrap();
        let request = serve_once(&d.api_sock(), "200 OK", r#"{"id":"d1","state":"RUNNING"}"#);

        let info = NydusdClient::new().check_status(&d).await.unwrap();
        assert_eq!(info.state, DaemonState::Running);

        let raw = request.await.unwrap();
        assert!(raw.starts_with("GET /api/v1/daemon HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_api_error_is_decoded() {
        let temp = tempfile::tempdir().unwrap();
        let d = daemon_at(temp.path());
        std::fs::create_dir_all(&d.socket_dir).unwrap();
        let _request = serve_once(
            &d.api_sock(),
            "500 Internal Server Error",
            r#"{"code":"Unsupported","message":"not ready"}"#,
        );

        let err = NydusdClient::new().check_status(&d).await.unwrap_err();
        match err {
            ClientError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(code, "Unsupported");
                assert_eq!(message, "not ready");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_socket_fails() {
        let temp = tempfile::tempdir().unwrap();
        let d = daemon_at(temp.path());
        let err = NydusdClient::new().check_status(&d).await.unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }

    #[tokio::test]
    async fn test_shared_umount_encodes_mountpoint() {
        let temp = tempfile::tempdir().unwrap();
        let d = daemon_at(temp.path()).root_mount_point("/mnt/nydus");
        std::fs::create_dir_all(&d.socket_dir).unwrap();
        let request = serve_once(&d.api_sock(), "204 No Content", "");

        NydusdClient::new().shared_umount(&d).await.unwrap();

        let raw = request.await.unwrap();
        assert!(raw.starts_with("DELETE /api/v1/mount?mountpoint=%2Fsnap1%2Ffs HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_shared_mount_sends_bootstrap_and_config() {
        let temp = tempfile::tempdir().unwrap();
        let d = daemon_at(temp.path()).root_mount_point("/mnt/nydus");
        std::fs::create_dir_all(&d.socket_dir).unwrap();
        std::fs::write(d.config_file(), r#"{"device":{}}"#).unwrap();
        let boot_dir = d.snapshot_dir.join("snap1").join("fs").join("image");
        std::fs::create_dir_all(&boot_dir).unwrap();
        std::fs::write(boot_dir.join("image.boot"), b"boot").unwrap();
        let request = serve_once(&d.api_sock(), "204 No Content", "");

        NydusdClient::new().shared_mount(&d).await.unwrap();

        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /api/v1/mount?mountpoint=%2Fsnap1%2Ffs HTTP/1.1"));
        assert!(raw.contains(r#""fs_type":"rafs""#));
        assert!(raw.contains("image.boot"));
    }
}
