use std::path::{Path, PathBuf};

use crate::daemon::{Daemon, DaemonError};

const LOG_LEVEL: &str = "info";
const THREAD_NUM: &str = "10";

/// Program and argument vector for launching one nydusd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl StartCommand {
    /// Value following `flag`, if present.
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    pub(crate) fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Build the nydusd invocation for `daemon`.
///
/// A dedicated daemon serves exactly its snapshot's bootstrap; the shared
/// daemon only gets its root mountpoint and receives images later through
/// its API.
pub fn build_start_command(binary: &Path, daemon: &Daemon) -> Result<StartCommand, DaemonError> {
    let mut args = vec![
        "--apisock".to_string(),
        display(&daemon.api_sock()),
        "--log-level".to_string(),
        LOG_LEVEL.to_string(),
        "--thread-num".to_string(),
        THREAD_NUM.to_string(),
    ];

    if daemon.shared_daemon {
        let root = daemon
            .root_mount_point
            .as_ref()
            .ok_or_else(|| DaemonError::MissingRootMountPoint(daemon.id.clone()))?;
        args.extend(["--mountpoint".to_string(), display(root)]);
    } else {
        let bootstrap = daemon.bootstrap_file()?;
        args.extend([
            "--config".to_string(),
            display(&daemon.config_file()),
            "--bootstrap".to_string(),
            display(&bootstrap),
            "--mountpoint".to_string(),
            display(&daemon.mount_point()),
        ]);
    }

    Ok(StartCommand {
        program: binary.to_path_buf(),
        args,
    })
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
