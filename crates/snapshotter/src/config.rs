//! Snapshotter configuration, loaded from TOML

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::process::DEFAULT_NYDUSD_PATH;

pub const DEFAULT_ROOT_DIR: &str = "/var/lib/containerd-nydus";
pub const DATABASE_FILE_NAME: &str = "nydus.db";
pub const LOG_DIR_NAME: &str = "logs";
pub const SOCKET_DIR_NAME: &str = "socket";
pub const CONFIG_DIR_NAME: &str = "config";
pub const SNAPSHOTS_DIR_NAME: &str = "snapshots";
pub const SHARED_MOUNT_DIR_NAME: &str = "mnt";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the database, sockets, configs and logs
    pub root_dir: PathBuf,
    pub nydusd_path: PathBuf,
    /// Serve every image from one shared nydusd
    pub shared_daemon: bool,
    pub log_level: String,
    /// Also write logs to a daily file under `<root_dir>/logs`
    pub log_to_file: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            nydusd_path: PathBuf::from(DEFAULT_NYDUSD_PATH),
            shared_daemon: false,
            log_level: "info".to_string(),
            log_to_file: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_dir.join(DATABASE_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root_dir.join(LOG_DIR_NAME)
    }

    pub fn socket_dir(&self) -> PathBuf {
        self.root_dir.join(SOCKET_DIR_NAME)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root_dir.join(CONFIG_DIR_NAME)
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.root_dir.join(SNAPSHOTS_DIR_NAME)
    }

    /// Root mountpoint handed to the shared daemon.
    pub fn shared_mount_point(&self) -> PathBuf {
        self.root_dir.join(SHARED_MOUNT_DIR_NAME)
    }
}
