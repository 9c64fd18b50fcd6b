//! The image daemon entity
//!
//! A [`Daemon`] describes one nydusd process (or, in shared mode, one logical
//! mount served by the single shared process): its identity, the snapshot it
//! serves, the pid once started, and the directories it owns.
//!
//! Records are persisted through a [`Store`](crate::store::Store); only the
//! log file handles live purely in memory.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod client;
mod state;

pub use client::{ClientError, DaemonApi, NydusdClient};
pub use state::{DaemonInfo, DaemonState};

/// Reserved id of the shared daemon singleton.
pub const SHARED_DAEMON_ID: &str = "shared_daemon";

const API_SOCK_NAME: &str = "api.sock";
const CONFIG_FILE_NAME: &str = "config.json";
const STDOUT_LOG_NAME: &str = "stdout.log";
const STDERR_LOG_NAME: &str = "stderr.log";
const BOOTSTRAP_NAME: &str = "image.boot";

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("bootstrap for snapshot {snapshot_id} not found under {}", dir.display())]
    BootstrapNotFound { snapshot_id: String, dir: PathBuf },
    #[error("shared daemon {0} has no root mountpoint")]
    MissingRootMountPoint(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Log files owned by a started daemon.
///
/// Dropping the last reference closes both handles.
#[derive(Debug)]
pub struct DaemonLogs {
    pub stdout: File,
    pub stderr: File,
}

impl DaemonLogs {
    /// Open (creating if needed) the stdout/stderr logs inside `log_dir`.
    pub fn open(log_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let open = |name: &str| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_dir.join(name))
        };
        Ok(Self {
            stdout: open(STDOUT_LOG_NAME)?,
            stderr: open(STDERR_LOG_NAME)?,
        })
    }
}

/// One managed image daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Daemon {
    pub id: String,
    pub snapshot_id: String,
    /// `None` means the pid is not tracked, not that the process is dead
    pub pid: Option<u32>,
    pub shared_daemon: bool,
    pub root_mount_point: Option<PathBuf>,
    pub snapshot_dir: PathBuf,
    pub socket_dir: PathBuf,
    pub config_dir: PathBuf,
    pub log_dir: PathBuf,
    pub api_socket: Option<PathBuf>,
    #[serde(skip)]
    pub logs: Option<Arc<DaemonLogs>>,
}

impl Daemon {
    /// Create a record for `snapshot_id` with a freshly generated id.
    pub fn new(snapshot_id: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().simple().to_string(), snapshot_id)
    }

    /// Create a record with an explicit id.
    pub fn with_id(id: impl Into<String>, snapshot_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            snapshot_id: snapshot_id.into(),
            pid: None,
            shared_daemon: false,
            root_mount_point: None,
            snapshot_dir: PathBuf::new(),
            socket_dir: PathBuf::new(),
            config_dir: PathBuf::new(),
            log_dir: PathBuf::new(),
            api_socket: None,
            logs: None,
        }
    }

    /// The shared daemon singleton, serving every virtual mount under
    /// `root_mount_point`.
    pub fn shared(root_mount_point: impl Into<PathBuf>) -> Self {
        Self::with_id(SHARED_DAEMON_ID, SHARED_DAEMON_ID)
            .shared_daemon(true)
            .root_mount_point(root_mount_point)
    }

    /* Builder-style setters */

    /// Place the socket directory at `<base>/<id>`.
    pub fn socket_dir(mut self, base: impl AsRef<Path>) -> Self {
        self.socket_dir = base.as_ref().join(&self.id);
        self
    }

    /// Place the config directory at `<base>/<id>`.
    pub fn config_dir(mut self, base: impl AsRef<Path>) -> Self {
        self.config_dir = base.as_ref().join(&self.id);
        self
    }

    /// Place the log directory at `<base>/<id>`.
    pub fn log_dir(mut self, base: impl AsRef<Path>) -> Self {
        self.log_dir = base.as_ref().join(&self.id);
        self
    }

    pub fn snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }

    pub fn shared_daemon(mut self, shared: bool) -> Self {
        self.shared_daemon = shared;
        self
    }

    pub fn root_mount_point(mut self, mount_point: impl Into<PathBuf>) -> Self {
        self.root_mount_point = Some(mount_point.into());
        self
    }

    /// Override the API socket, e.g. to point a virtual record at the shared
    /// daemon's socket.
    pub fn api_socket(mut self, sock: impl Into<PathBuf>) -> Self {
        self.api_socket = Some(sock.into());
        self
    }

    /* Getters */

    pub fn is_shared_daemon_singleton(&self) -> bool {
        self.id == SHARED_DAEMON_ID
    }

    pub fn api_sock(&self) -> PathBuf {
        match &self.api_socket {
            Some(sock) => sock.clone(),
            None => self.socket_dir.join(API_SOCK_NAME),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(STDERR_LOG_NAME)
    }

    /// Mountpoint of the image filesystem.
    ///
    /// For records living inside the shared daemon this is the path within
    /// the shared daemon's namespace, not a host path.
    pub fn mount_point(&self) -> PathBuf {
        match &self.root_mount_point {
            Some(_) => Path::new("/").join(&self.snapshot_id).join("fs"),
            None => self.snapshot_dir.join(&self.snapshot_id).join("fs"),
        }
    }

    /// Host path of a virtual mount inside the shared daemon's root.
    pub fn shared_mount_point(&self) -> Option<PathBuf> {
        self.root_mount_point
            .as_ref()
            .map(|root| root.join(&self.snapshot_id).join("fs"))
    }

    /// Kernel mountpoint backing this record on the host.
    ///
    /// The shared singleton owns the whole root mountpoint.
    pub fn host_mount_point(&self) -> PathBuf {
        match (&self.root_mount_point, self.shared_daemon) {
            (Some(root), true) if self.is_shared_daemon_singleton() => root.clone(),
            (Some(_), true) => self.shared_mount_point().unwrap_or_else(|| self.mount_point()),
            _ => self.mount_point(),
        }
    }

    /// Locate the bootstrap, preferring `fs/image/image.boot` over the legacy
    /// `fs/image.boot`.
    pub fn bootstrap_file(&self) -> Result<PathBuf, DaemonError> {
        bootstrap_file(&self.snapshot_dir, &self.snapshot_id)
    }

    /// Open the daemon's stdout/stderr log files.
    pub fn open_logs(&mut self) -> Result<(), DaemonError> {
        self.logs = Some(Arc::new(DaemonLogs::open(&self.log_dir)?));
        Ok(())
    }

    /// Drop this record's reference to its log files.
    pub fn close_logs(&mut self) {
        self.logs = None;
    }

    /// Copy of the record with in-memory-only state stripped.
    pub fn persisted(&self) -> Self {
        Self {
            logs: None,
            ..self.clone()
        }
    }
}

/// Resolve the bootstrap file of `snapshot_id` inside `snapshot_dir`.
pub fn bootstrap_file(snapshot_dir: &Path, snapshot_id: &str) -> Result<PathBuf, DaemonError> {
    let fs_dir = snapshot_dir.join(snapshot_id).join("fs");
    [
        fs_dir.join("image").join(BOOTSTRAP_NAME),
        fs_dir.join(BOOTSTRAP_NAME),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
    .ok_or_else(|| DaemonError::BootstrapNotFound {
        snapshot_id: snapshot_id.to_string(),
        dir: fs_dir,
    })
}
