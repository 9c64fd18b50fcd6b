//! Daemon lifecycle management
//!
//! The [`Manager`] keeps the durable daemon records consistent with the
//! nydusd processes and kernel mounts that actually exist: it registers new
//! daemons, launches and supervises processes, reconciles state after a
//! restart, and tears everything down again.

mod command;
mod manager;
mod supervisor;

pub use command::{build_start_command, StartCommand};
pub use manager::{Manager, ManagerBuilder, ManagerError, TeardownError, DEFAULT_NYDUSD_PATH};
pub use supervisor::DaemonExit;
