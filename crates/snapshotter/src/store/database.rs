//! SQLite connection pool for daemon records.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use tracing::info;

/// Database connection pool for daemon records.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl std::ops::Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

/// Errors that can occur when setting up the database.
#[derive(Debug, Error)]
pub enum DatabaseSetupError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("failed to create database directory: {0}")]
    Directory(#[from] std::io::Error),
}

impl Database {
    /// Open (or create) a file-based database and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, DatabaseSetupError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        info!("Daemon database initialized at {:?}", path);
        Ok(db)
    }

    /// Create a new in-memory database.
    pub async fn in_memory() -> Result<Self, DatabaseSetupError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        // a second connection would see a different, empty database, and
        // recycling the only one would drop this one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        info!("Daemon database initialized in-memory");
        Ok(db)
    }

    pub(crate) async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daemons (
                id TEXT PRIMARY KEY,
                snapshot_id TEXT NOT NULL,
                pid INTEGER,
                shared_daemon INTEGER NOT NULL,
                root_mount_point TEXT,
                snapshot_dir TEXT NOT NULL,
                socket_dir TEXT NOT NULL,
                config_dir TEXT NOT NULL,
                log_dir TEXT NOT NULL,
                api_socket TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_daemons_snapshot_id ON daemons(snapshot_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of persisted daemon records.
    pub async fn daemon_count(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM daemons")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
