use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;

use super::{Store, StoreError};
use crate::daemon::Daemon;

/// In-process store keyed by daemon id.
///
/// Nothing survives a restart; used by tests and by embedders that keep
/// their own durable state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    daemons: RwLock<BTreeMap<String, Daemon>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.daemons.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.daemons.read().is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn add(&self, daemon: &Daemon) -> Result<(), StoreError> {
        self.daemons
            .write()
            .insert(daemon.id.clone(), daemon.persisted());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Daemon, StoreError> {
        self.daemons
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get_by_snapshot(&self, snapshot_id: &str) -> Result<Daemon, StoreError> {
        self.daemons
            .read()
            .values()
            .find(|d| d.snapshot_id == snapshot_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(snapshot_id.to_string()))
    }

    async fn delete(&self, daemon: &Daemon) -> Result<(), StoreError> {
        self.daemons.write().remove(&daemon.id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Daemon>, StoreError> {
        Ok(self.daemons.read().values().cloned().collect())
    }

    fn walk_daemons(&self) -> BoxStream<'_, Result<Daemon, StoreError>> {
        // snapshot under the read lock so the guard never crosses an await
        let daemons: Vec<_> = self.daemons.read().values().cloned().map(Ok).collect();
        stream::iter(daemons).boxed()
    }

    async fn cleanup_database(&self) -> Result<(), StoreError> {
        self.daemons.write().clear();
        Ok(())
    }
}
