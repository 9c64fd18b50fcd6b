use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::command::build_start_command;
use super::supervisor::{self, DaemonExit};
use crate::daemon::{
    ClientError, Daemon, DaemonApi, DaemonError, NydusdClient, SHARED_DAEMON_ID,
};
use crate::mount::{is_benign_umount_error, Mounter, SystemMounter};
use crate::store::{Store, StoreError};

pub const DEFAULT_NYDUSD_PATH: &str = "/usr/local/bin/nydusd";

const EXIT_CHANNEL_CAPACITY: usize = 64;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("daemon for snapshot {snapshot_id} already exists")]
    AlreadyExists { snapshot_id: String },
    #[error("daemon not found: {0}")]
    NotFound(String),
    #[error("failed to spawn daemon {id}: {source}")]
    SpawnFailed {
        id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("shared daemon mode is disabled, but a shared daemon record was found")]
    ConfigMismatch,
    #[error("failed to tear down daemon {id}: {source}")]
    TeardownFailed {
        id: String,
        #[source]
        source: TeardownError,
    },
    #[error("store error for daemon {id}: {source}")]
    Store {
        id: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to reconnect daemons: {0}")]
    Reconnect(#[source] StoreError),
    #[error("control request to daemon {id} failed: {source}")]
    Control {
        id: String,
        #[source]
        source: ClientError,
    },
    #[error("failed to build command for daemon {id}: {source}")]
    Command {
        id: String,
        #[source]
        source: DaemonError,
    },
}

impl ManagerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ManagerError::NotFound(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TeardownError {
    #[error("kill failed: {0}")]
    Kill(#[source] Errno),
    #[error("wait failed: {0}")]
    Wait(#[source] Errno),
    #[error("supervision task failed: {0}")]
    Join(String),
    #[error("failed to umount {}: {source}", path.display())]
    Umount {
        path: PathBuf,
        #[source]
        source: Errno,
    },
}

fn store_error(id: &str) -> impl FnOnce(StoreError) -> ManagerError + '_ {
    move |source| ManagerError::Store {
        id: id.to_string(),
        source,
    }
}

/// Coordinates the lifecycle of every nydusd this snapshotter owns.
///
/// Registration and removal are serialised by one async lock; `start` and
/// `reconnect` are not. Share across tasks with an `Arc`.
#[derive(Debug)]
pub struct Manager {
    store: Arc<dyn Store>,
    mounter: Arc<dyn Mounter>,
    client: Arc<dyn DaemonApi>,
    nydusd_path: PathBuf,
    shared_daemon: bool,
    lock: Mutex<()>,
    supervisors: parking_lot::Mutex<HashMap<String, JoinHandle<()>>>,
    exits: broadcast::Sender<DaemonExit>,
}

/// Builder for [`Manager`]; a store must be supplied before building.
///
/// The type parameter is the store slot: `()` until [`ManagerBuilder::store`]
/// is called.
#[derive(Debug)]
pub struct ManagerBuilder<S = ()> {
    store: S,
    mounter: Arc<dyn Mounter>,
    client: Arc<dyn DaemonApi>,
    nydusd_path: PathBuf,
    shared_daemon: bool,
}

impl Default for ManagerBuilder<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerBuilder<()> {
    pub fn new() -> Self {
        ManagerBuilder {
            store: (),
            mounter: Arc::new(SystemMounter),
            client: Arc::new(NydusdClient::new()),
            nydusd_path: PathBuf::from(DEFAULT_NYDUSD_PATH),
            shared_daemon: false,
        }
    }

    pub fn store(self, store: Arc<dyn Store>) -> ManagerBuilder<Arc<dyn Store>> {
        ManagerBuilder {
            store,
            mounter: self.mounter,
            client: self.client,
            nydusd_path: self.nydusd_path,
            shared_daemon: self.shared_daemon,
        }
    }
}

impl<S> ManagerBuilder<S> {
    pub fn mounter(mut self, mounter: Arc<dyn Mounter>) -> Self {
        self.mounter = mounter;
        self
    }

    pub fn client(mut self, client: Arc<dyn DaemonApi>) -> Self {
        self.client = client;
        self
    }

    pub fn nydusd_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.nydusd_path = path.into();
        self
    }

    pub fn shared_daemon(mut self, enabled: bool) -> Self {
        self.shared_daemon = enabled;
        self
    }
}

impl ManagerBuilder<Arc<dyn Store>> {
    pub fn build(self) -> Manager {
        let (exits, _) = broadcast::channel(EXIT_CHANNEL_CAPACITY);
        Manager {
            store: self.store,
            mounter: self.mounter,
            client: self.client,
            nydusd_path: self.nydusd_path,
            shared_daemon: self.shared_daemon,
            lock: Mutex::new(()),
            supervisors: parking_lot::Mutex::new(HashMap::new()),
            exits,
        }
    }
}

impl Manager {
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    pub fn is_shared_mode(&self) -> bool {
        self.shared_daemon
    }

    pub fn nydusd_path(&self) -> &Path {
        &self.nydusd_path
    }

    /// Receive a [`DaemonExit`] for every process this manager spawned.
    pub fn subscribe_exits(&self) -> broadcast::Receiver<DaemonExit> {
        self.exits.subscribe()
    }

    /* Registration */

    /// Persist a new record. Fails if any record already serves its snapshot.
    pub async fn register(&self, daemon: &Daemon) -> Result<(), ManagerError> {
        let _guard = self.lock.lock().await;

        match self.store.get_by_snapshot(&daemon.snapshot_id).await {
            Ok(_) => {
                return Err(ManagerError::AlreadyExists {
                    snapshot_id: daemon.snapshot_id.clone(),
                })
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(store_error(&daemon.id)(e)),
        }

        self.store.add(daemon).await.map_err(store_error(&daemon.id))?;
        debug!(daemon = %daemon.id, snapshot = %daemon.snapshot_id, "registered daemon");
        Ok(())
    }

    pub async fn get_by_snapshot_id(&self, snapshot_id: &str) -> Result<Daemon, ManagerError> {
        self.store
            .get_by_snapshot(snapshot_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => ManagerError::NotFound(snapshot_id.to_string()),
                e => store_error(snapshot_id)(e),
            })
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Daemon, ManagerError> {
        self.store.get(id).await.map_err(|e| match e {
            StoreError::NotFound(_) => ManagerError::NotFound(id.to_string()),
            e => store_error(id)(e),
        })
    }

    /// Drop a record from the store. Removing an absent record succeeds.
    pub async fn remove(&self, daemon: &Daemon) -> Result<(), ManagerError> {
        let _guard = self.lock.lock().await;
        self.store
            .delete(daemon)
            .await
            .map_err(store_error(&daemon.id))
    }

    /// Remove the record serving `snapshot_id` and hand it back so the
    /// caller can release its resources.
    pub async fn delete_by_snapshot_id(&self, snapshot_id: &str) -> Result<Daemon, ManagerError> {
        let _guard = self.lock.lock().await;
        let daemon = self.get_by_snapshot_id(snapshot_id).await?;
        self.store
            .delete(&daemon)
            .await
            .map_err(store_error(&daemon.id))?;
        Ok(daemon)
    }

    pub async fn list(&self) -> Result<Vec<Daemon>, ManagerError> {
        self.store.list().await.map_err(|source| ManagerError::Store {
            id: "*".to_string(),
            source,
        })
    }

    /* Process supervision */

    /// Launch nydusd for `daemon` and record its pid in place.
    ///
    /// The record is not persisted; callers `register` or re-`add` it.
    pub async fn start(&self, daemon: &mut Daemon) -> Result<(), ManagerError> {
        let command = build_start_command(&self.nydusd_path, daemon).map_err(|source| {
            ManagerError::Command {
                id: daemon.id.clone(),
                source,
            }
        })?;

        let spawned = supervisor::spawn(&command, daemon, self.exits.clone()).map_err(|source| {
            ManagerError::SpawnFailed {
                id: daemon.id.clone(),
                source,
            }
        })?;

        info!(
            daemon = %daemon.id,
            snapshot = %daemon.snapshot_id,
            pid = spawned.pid,
            "started nydusd"
        );
        daemon.pid = Some(spawned.pid);
        if let Some(stale) = self
            .supervisors
            .lock()
            .insert(daemon.id.clone(), spawned.task)
        {
            warn!(daemon = %daemon.id, "replacing supervision task of a previous start");
            drop(stale);
        }
        Ok(())
    }

    /// Ask the shared daemon to serve `daemon`'s image at its mountpoint.
    pub async fn mount_shared(&self, daemon: &Daemon) -> Result<(), ManagerError> {
        self.client
            .shared_mount(daemon)
            .await
            .map_err(|source| ManagerError::Control {
                id: daemon.id.clone(),
                source,
            })?;
        info!(daemon = %daemon.id, mountpoint = %daemon.mount_point().display(), "mounted in shared daemon");
        Ok(())
    }

    /* Reconnect */

    /// Rebuild the store from the daemons that survived a restart.
    ///
    /// Dedicated daemons (and the shared daemon itself) must answer a
    /// status probe to survive; virtual records of the shared daemon are
    /// kept without probing. Returns the records that were re-registered.
    pub async fn reconnect(&self) -> Result<Vec<Daemon>, ManagerError> {
        let mut survivors = Vec::new();
        let mut shared_found = false;

        {
            let mut walk = self.store.walk_daemons();
            while let Some(item) = walk.next().await {
                let daemon = item.map_err(ManagerError::Reconnect)?;
                info!(daemon = %daemon.id, shared = daemon.shared_daemon, "found daemon in store");

                let singleton = daemon.is_shared_daemon_singleton();
                if singleton {
                    shared_found = true;
                }

                if self.shared_daemon && !singleton {
                    info!(daemon = %daemon.id, "found virtual daemon");
                    survivors.push(daemon);
                    continue;
                }

                match self.client.check_status(&daemon).await {
                    Ok(status) => {
                        info!(daemon = %daemon.id, state = %status.state, "found alive daemon");
                        survivors.push(daemon);
                    }
                    Err(e) => {
                        warn!(daemon = %daemon.id, error = %e, "failed to check daemon status");
                    }
                }
            }
        }

        if !self.shared_daemon && shared_found {
            return Err(ManagerError::ConfigMismatch);
        }

        info!(count = survivors.len(), "reconnected daemons");
        // a failure past this point leaves the store empty
        self.store
            .cleanup_database()
            .await
            .map_err(ManagerError::Reconnect)?;

        for daemon in &survivors {
            self.register(daemon).await?;
        }

        Ok(survivors)
    }

    /* Destruction */

    /// Remove the record and release everything it owns.
    ///
    /// Shared records are unmounted through the shared daemon and no process
    /// is killed. Otherwise a known pid is killed and reaped before the
    /// mountpoint is unmounted. Not transactional: the record is gone from
    /// the store even when a later step fails.
    pub async fn destroy(&self, mut daemon: Daemon) -> Result<(), ManagerError> {
        self.store
            .delete(&daemon)
            .await
            .map_err(store_error(&daemon.id))?;
        let dedicated = !daemon.shared_daemon;
        self.cleanup_resources(&mut daemon, dedicated);

        info!(daemon = %daemon.id, mountpoint = %daemon.mount_point().display(), "destroying daemon");

        if daemon.shared_daemon {
            return self
                .client
                .shared_umount(&daemon)
                .await
                .map_err(|source| ManagerError::Control {
                    id: daemon.id.clone(),
                    source,
                });
        }

        self.teardown(&daemon)
            .await
            .map_err(|source| ManagerError::TeardownFailed {
                id: daemon.id.clone(),
                source,
            })
    }

    pub async fn destroy_by_snapshot_id(&self, snapshot_id: &str) -> Result<(), ManagerError> {
        let _guard = self.lock.lock().await;
        let daemon = self.get_by_snapshot_id(snapshot_id).await?;
        self.destroy(daemon).await
    }

    /// Stop the shared daemon process itself.
    ///
    /// Removes its record and directories, socket directory included, kills
    /// the process and unmounts the root mountpoint. Virtual records are left
    /// alone; destroy them first.
    pub async fn shutdown_shared_daemon(&self) -> Result<(), ManagerError> {
        let _guard = self.lock.lock().await;
        let mut daemon = self.get_by_id(SHARED_DAEMON_ID).await?;
        self.store
            .delete(&daemon)
            .await
            .map_err(store_error(&daemon.id))?;
        self.cleanup_resources(&mut daemon, true);

        info!(daemon = %daemon.id, pid = ?daemon.pid, "shutting down shared daemon");
        self.teardown(&daemon)
            .await
            .map_err(|source| ManagerError::TeardownFailed {
                id: daemon.id.clone(),
                source,
            })
    }

    /// Destroy every registered daemon, then shut down the shared daemon.
    ///
    /// Keeps going past failures and returns the first one.
    pub async fn destroy_all(&self) -> Result<usize, ManagerError> {
        let (singleton, daemons): (Vec<_>, Vec<_>) = self
            .list()
            .await?
            .into_iter()
            .partition(|d| d.is_shared_daemon_singleton());

        let mut destroyed = 0;
        let mut first_error = None;
        for daemon in daemons {
            let id = daemon.id.clone();
            match self.destroy(daemon).await {
                Ok(()) => destroyed += 1,
                Err(e) => {
                    warn!(daemon = %id, error = %e, "failed to destroy daemon");
                    first_error.get_or_insert(e);
                }
            }
        }

        if !singleton.is_empty() {
            match self.shutdown_shared_daemon().await {
                Ok(()) => destroyed += 1,
                Err(e) => {
                    warn!(error = %e, "failed to shut down shared daemon");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(destroyed),
        }
    }

    fn cleanup_resources(&self, daemon: &mut Daemon, remove_socket_dir: bool) {
        daemon.close_logs();

        let mut dirs = vec![&daemon.config_dir, &daemon.log_dir];
        if remove_socket_dir {
            dirs.push(&daemon.socket_dir);
        }
        for dir in dirs {
            if dir.as_os_str().is_empty() {
                continue;
            }
            match std::fs::remove_dir_all(dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(daemon = %daemon.id, dir = %dir.display(), error = %e, "failed to remove daemon directory");
                }
            }
        }
    }

    async fn teardown(&self, daemon: &Daemon) -> Result<(), TeardownError> {
        if let Some(pid) = daemon.pid {
            self.terminate(&daemon.id, pid).await?;
        }

        let target = daemon.host_mount_point();
        match self.mounter.umount(&target) {
            Ok(()) => Ok(()),
            Err(errno) if is_benign_umount_error(errno) => {
                debug!(daemon = %daemon.id, mountpoint = %target.display(), "already unmounted");
                Ok(())
            }
            Err(source) => Err(TeardownError::Umount {
                path: target,
                source,
            }),
        }
    }

    async fn terminate(&self, id: &str, pid: u32) -> Result<(), TeardownError> {
        let pid = Pid::from_raw(i32::try_from(pid).map_err(|_| TeardownError::Kill(Errno::EINVAL))?);

        match kill(pid, Signal::SIGKILL) {
            Ok(()) => {}
            Err(Errno::ESRCH) => debug!(daemon = %id, %pid, "process already exited"),
            Err(e) => return Err(TeardownError::Kill(e)),
        }

        let task = self.supervisors.lock().remove(id);
        match task {
            Some(task) => task
                .await
                .map_err(|e| TeardownError::Join(e.to_string())),
            None => wait_untracked(pid).await,
        }
    }
}

/// Wait for a process this manager did not spawn.
///
/// Reaps it when it is our child; otherwise polls until the pid is gone.
async fn wait_untracked(pid: Pid) -> Result<(), TeardownError> {
    let reaped = tokio::task::spawn_blocking(move || waitpid(pid, None))
        .await
        .map_err(|e| TeardownError::Join(e.to_string()))?;

    match reaped {
        Ok(_) => return Ok(()),
        Err(Errno::ECHILD) => {}
        Err(e) => return Err(TeardownError::Wait(e)),
    }

    loop {
        match kill(pid, None) {
            Err(Errno::ESRCH) => return Ok(()),
            Ok(()) | Err(Errno::EPERM) => tokio::time::sleep(EXIT_POLL_INTERVAL).await,
            Err(e) => return Err(TeardownError::Wait(e)),
        }
    }
}
