use std::path::PathBuf;

use clap::Parser;

use snapshotter::config::{Config, ConfigError};

pub mod op;
pub mod ops;

crate::command_enum! {
    (Reconnect, ops::Reconnect),
    (List, ops::List),
    (Destroy, ops::Destroy),
    (Cleanup, ops::Cleanup),
}

#[derive(Parser, Debug)]
#[command(name = "nydus-snapshotter", version, about = "Manage nydusd image daemons")]
pub struct Args {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "NYDUS_SNAPSHOTTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root directory for the database, sockets and logs
    #[arg(long, global = true)]
    pub root_dir: Option<PathBuf>,

    /// Path to the nydusd binary
    #[arg(long, global = true)]
    pub nydusd_path: Option<PathBuf>,

    /// Serve every image from one shared nydusd
    #[arg(long, global = true)]
    pub shared_daemon: bool,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Load the config file (or defaults) and apply command-line overrides.
    pub fn resolve_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(root_dir) = &self.root_dir {
            config.root_dir = root_dir.clone();
        }
        if let Some(nydusd_path) = &self.nydusd_path {
            config.nydusd_path = nydusd_path.clone();
        }
        if self.shared_daemon {
            config.shared_daemon = true;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }

        Ok(config)
    }
}
