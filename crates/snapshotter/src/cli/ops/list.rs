use clap::Args;

use crate::cli::op::{Op, OpContext};
use snapshotter::{Daemon, ManagerError};

#[derive(Args, Debug, Clone)]
pub struct List {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[async_trait::async_trait]
impl Op for List {
    type Error = ListError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let daemons = ctx.manager.list().await?;

        if self.json {
            return Ok(serde_json::to_string_pretty(&daemons)?);
        }
        if daemons.is_empty() {
            return Ok(format!(
                "No daemons registered under {}",
                ctx.config.root_dir.display()
            ));
        }
        Ok(render_table(&daemons))
    }
}

/// Render records as a fixed-width table.
pub fn render_table(daemons: &[Daemon]) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:<32} {:<24} {:<8} {:<6} {}\n",
        "DAEMON ID", "SNAPSHOT", "PID", "SHARED", "MOUNT POINT"
    ));
    output.push_str(&"-".repeat(100));
    output.push('\n');

    for daemon in daemons {
        output.push_str(&format!(
            "{:<32} {:<24} {:<8} {:<6} {}\n",
            daemon.id,
            truncate(&daemon.snapshot_id, 24),
            daemon
                .pid
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| "-".to_string()),
            if daemon.shared_daemon { "yes" } else { "no" },
            daemon.host_mount_point().display(),
        ));
    }

    output
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let tail: String = s.chars().skip(s.chars().count() - (max_len - 3)).collect();
        format!("...{}", tail)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("manager error: {0}")]
    Manager(#[from] ManagerError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl std::fmt::Display for List {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "list")
    }
}
