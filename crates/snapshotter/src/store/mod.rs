//! Durable daemon record storage
//!
//! The manager is the only writer; implementations need read safety under a
//! single concurrent writer but no write-write locking of their own.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::daemon::Daemon;

mod daemon_queries;
mod database;
mod memory;

pub use database::{Database, DatabaseSetupError};
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("daemon not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Persist a record, replacing any record with the same id.
    async fn add(&self, daemon: &Daemon) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Daemon, StoreError>;

    async fn get_by_snapshot(&self, snapshot_id: &str) -> Result<Daemon, StoreError>;

    /// Delete a record. Deleting an absent record is not an error.
    async fn delete(&self, daemon: &Daemon) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<Daemon>, StoreError>;

    /// Stream every persisted record. Walking never mutates the store; the
    /// first error item ends the walk.
    fn walk_daemons(&self) -> BoxStream<'_, Result<Daemon, StoreError>>;

    /// Remove every record.
    async fn cleanup_database(&self) -> Result<(), StoreError>;
}
