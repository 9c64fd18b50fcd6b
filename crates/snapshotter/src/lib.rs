// Daemon entity and its control channel
pub mod daemon;
pub mod mount;
pub mod store;

// Lifecycle management
pub mod process;

// Service plumbing
pub mod config;
pub mod logging;

pub use config::Config;
pub use daemon::{Daemon, DaemonApi, DaemonState, NydusdClient, SHARED_DAEMON_ID};
pub use mount::{Mounter, NoopMounter, SystemMounter};
pub use process::{DaemonExit, Manager, ManagerBuilder, ManagerError};
pub use store::{Database, MemoryStore, Store, StoreError};
