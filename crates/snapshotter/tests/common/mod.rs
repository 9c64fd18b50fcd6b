#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use nix::errno::Errno;
use parking_lot::Mutex;

use snapshotter::daemon::{ClientError, DaemonInfo};
use snapshotter::{
    Daemon, DaemonApi, DaemonState, Manager, MemoryStore, Mounter, Store, StoreError,
};

/// Mounter that records targets and fails with a fixed errno when set.
#[derive(Debug, Default)]
pub struct FakeMounter {
    pub error: Mutex<Option<Errno>>,
    pub calls: Mutex<Vec<PathBuf>>,
}

impl FakeMounter {
    pub fn failing(errno: Errno) -> Self {
        Self {
            error: Mutex::new(Some(errno)),
            calls: Mutex::default(),
        }
    }
}

impl Mounter for FakeMounter {
    fn umount(&self, target: &Path) -> Result<(), Errno> {
        self.calls.lock().push(target.to_path_buf());
        match *self.error.lock() {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }
}

/// Control client where only the listed daemon ids answer probes.
#[derive(Debug, Default)]
pub struct FakeClient {
    pub alive: HashSet<String>,
    pub probed: Mutex<Vec<String>>,
    pub mounted: Mutex<Vec<String>>,
    pub umounted: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn alive<I: IntoIterator<Item = &'static str>>(ids: I) -> Self {
        Self {
            alive: ids.into_iter().map(String::from).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl DaemonApi for FakeClient {
    async fn check_status(&self, daemon: &Daemon) -> Result<DaemonInfo, ClientError> {
        self.probed.lock().push(daemon.id.clone());
        if self.alive.contains(&daemon.id) {
            Ok(DaemonInfo {
                id: Some(daemon.id.clone()),
                version: None,
                state: DaemonState::Running,
            })
        } else {
            Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        }
    }

    async fn shared_mount(&self, daemon: &Daemon) -> Result<(), ClientError> {
        self.mounted.lock().push(daemon.id.clone());
        Ok(())
    }

    async fn shared_umount(&self, daemon: &Daemon) -> Result<(), ClientError> {
        self.umounted.lock().push(daemon.id.clone());
        Ok(())
    }
}

/// Memory store that can stall deletes and fail walks or cleanups.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub delete_delay: Option<Duration>,
    pub fail_walk: bool,
    pub fail_cleanup: bool,
}

#[async_trait]
impl Store for FlakyStore {
    async fn add(&self, daemon: &Daemon) -> Result<(), StoreError> {
        self.inner.add(daemon).await
    }

    async fn get(&self, id: &str) -> Result<Daemon, StoreError> {
        self.inner.get(id).await
    }

    async fn get_by_snapshot(&self, snapshot_id: &str) -> Result<Daemon, StoreError> {
        self.inner.get_by_snapshot(snapshot_id).await
    }

    async fn delete(&self, daemon: &Daemon) -> Result<(), StoreError> {
        if let Some(delay) = self.delete_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.delete(daemon).await
    }

    async fn list(&self) -> Result<Vec<Daemon>, StoreError> {
        self.inner.list().await
    }

    fn walk_daemons(&self) -> BoxStream<'_, Result<Daemon, StoreError>> {
        let walk = self.inner.walk_daemons();
        if !self.fail_walk {
            return walk;
        }
        walk.chain(stream::once(async {
            Err(StoreError::Serialization("truncated record".to_string()))
        }))
        .boxed()
    }

    async fn cleanup_database(&self) -> Result<(), StoreError> {
        if self.fail_cleanup {
            return Err(StoreError::Serialization("cleanup rejected".to_string()));
        }
        self.inner.cleanup_database().await
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub mounter: Arc<FakeMounter>,
    pub client: Arc<FakeClient>,
    pub manager: Manager,
    pub root: tempfile::TempDir,
}

impl Harness {
    pub fn new(shared_daemon: bool) -> Self {
        Self::with(shared_daemon, FakeMounter::default(), FakeClient::default())
    }

    pub fn with(shared_daemon: bool, mounter: FakeMounter, client: FakeClient) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mounter = Arc::new(mounter);
        let client = Arc::new(client);
        let manager = Manager::builder()
            .store(store.clone())
            .mounter(mounter.clone())
            .client(client.clone())
            .shared_daemon(shared_daemon)
            .build();
        Self {
            store,
            mounter,
            client,
            manager,
            root: tempfile::tempdir().unwrap(),
        }
    }

    /// A second manager over `store`, sharing this harness's fakes.
    pub fn manager_over(&self, store: Arc<dyn Store>, shared_daemon: bool) -> Manager {
        Manager::builder()
            .store(store)
            .mounter(self.mounter.clone())
            .client(self.client.clone())
            .shared_daemon(shared_daemon)
            .build()
    }

    /// A record whose owned directories exist on disk.
    pub fn record(&self, id: &str, snapshot_id: &str) -> Daemon {
        let root = self.root.path();
        let d = Daemon::with_id(id, snapshot_id)
            .snapshot_dir(root.join("snapshots"))
            .socket_dir(root.join("socket"))
            .config_dir(root.join("config"))
            .log_dir(root.join("logs"));
        for dir in [&d.socket_dir, &d.config_dir, &d.log_dir] {
            std::fs::create_dir_all(dir).unwrap();
        }
        d
    }

    /// A virtual record served by the shared daemon.
    pub fn virtual_record(&self, id: &str, snapshot_id: &str) -> Daemon {
        let root = self.root.path();
        let shared_sock = root.join("socket").join("shared_daemon").join("api.sock");
        self.record(id, snapshot_id)
            .shared_daemon(true)
            .root_mount_point(root.join("mnt"))
            .api_socket(shared_sock)
    }

    pub fn sentinel(&self) -> Daemon {
        let root = self.root.path();
        Daemon::shared(root.join("mnt"))
            .socket_dir(root.join("socket"))
            .config_dir(root.join("config"))
            .log_dir(root.join("logs"))
    }

    pub async fn stored_ids(&self) -> Vec<String> {
        use snapshotter::Store;
        let mut ids: Vec<String> = self
            .store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        ids.sort();
        ids
    }
}
