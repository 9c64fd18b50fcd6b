use std::io::Write;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::command::StartCommand;
use crate::daemon::{Daemon, DaemonLogs};

/// Exit of a daemon process spawned by this manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonExit {
    pub daemon_id: String,
    pub snapshot_id: String,
    /// Exit code; `None` when killed by a signal or the wait failed.
    pub status: Option<i32>,
}

pub(crate) struct Spawned {
    pub pid: u32,
    pub task: JoinHandle<()>,
}

/// Launch the process and a task that forwards its stderr until the
/// process exits, then reaps it and publishes a [`DaemonExit`].
pub(crate) fn spawn(
    command: &StartCommand,
    daemon: &Daemon,
    exits: broadcast::Sender<DaemonExit>,
) -> std::io::Result<Spawned> {
    let mut cmd = command.to_command();
    cmd.stdin(Stdio::null()).stderr(Stdio::piped());
    match &daemon.logs {
        Some(logs) => cmd.stdout(logs.stdout.try_clone()?),
        None => cmd.stdout(Stdio::null()),
    };

    let mut child = cmd.spawn()?;
    let pid = child
        .id()
        .ok_or_else(|| std::io::Error::other("spawned process has no pid"))?;

    let stderr = child.stderr.take();
    let logs = daemon.logs.clone();
    let daemon_id = daemon.id.clone();
    let snapshot_id = daemon.snapshot_id.clone();

    let task = tokio::spawn(async move {
        if let Some(stderr) = stderr {
            forward_stderr(&daemon_id, stderr, logs.as_deref()).await;
        }
        let status = wait(&daemon_id, child).await;
        info!(daemon = %daemon_id, snapshot = %snapshot_id, ?status, "nydusd exited");
        // no receivers is fine
        let _ = exits.send(DaemonExit {
            daemon_id,
            snapshot_id,
            status,
        });
    });

    Ok(Spawned { pid, task })
}

async fn forward_stderr(daemon_id: &str, stderr: ChildStderr, logs: Option<&DaemonLogs>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                info!(daemon = %daemon_id, "{}", line);
                if let Some(logs) = logs {
                    let mut out = &logs.stderr;
                    if let Err(e) = writeln!(out, "{}", line) {
                        warn!(daemon = %daemon_id, error = %e, "failed to write daemon log");
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(daemon = %daemon_id, error = %e, "failed to read daemon stderr");
                break;
            }
        }
    }
}

async fn wait(daemon_id: &str, mut child: Child) -> Option<i32> {
    match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(daemon = %daemon_id, error = %e, "failed to wait for nydusd");
            None
        }
    }
}
