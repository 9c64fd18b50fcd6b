use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::Row;

use super::{Database, Store, StoreError};
use crate::daemon::Daemon;

macro_rules! select_daemon {
    () => {
        r#"
    SELECT
        id, snapshot_id, pid, shared_daemon, root_mount_point,
        snapshot_dir, socket_dir, config_dir, log_dir, api_socket
    FROM daemons
"#
    };
}

const SELECT_DAEMON: &str = select_daemon!();

// the walk stream borrows its SQL, so it needs a 'static string
const WALK_DAEMONS: &str = concat!(select_daemon!(), " ORDER BY rowid ASC");

#[async_trait]
impl Store for Database {
    async fn add(&self, daemon: &Daemon) -> Result<(), StoreError> {
        let pid = daemon.pid.map(i64::from);
        let root_mount_point = daemon
            .root_mount_point
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        let api_socket = daemon
            .api_socket
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO daemons (
                id, snapshot_id, pid, shared_daemon, root_mount_point,
                snapshot_dir, socket_dir, config_dir, log_dir, api_socket
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&daemon.id)
        .bind(&daemon.snapshot_id)
        .bind(pid)
        .bind(daemon.shared_daemon)
        .bind(root_mount_point)
        .bind(daemon.snapshot_dir.to_string_lossy().into_owned())
        .bind(daemon.socket_dir.to_string_lossy().into_owned())
        .bind(daemon.config_dir.to_string_lossy().into_owned())
        .bind(daemon.log_dir.to_string_lossy().into_owned())
        .bind(api_socket)
        .execute(&**self)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Daemon, StoreError> {
        let row = sqlx::query(&format!("{SELECT_DAEMON} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&**self)
            .await?;

        match row {
            Some(r) => row_to_daemon(&r),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn get_by_snapshot(&self, snapshot_id: &str) -> Result<Daemon, StoreError> {
        let row = sqlx::query(&format!("{SELECT_DAEMON} WHERE snapshot_id = ?1 LIMIT 1"))
            .bind(snapshot_id)
            .fetch_optional(&**self)
            .await?;

        match row {
            Some(r) => row_to_daemon(&r),
            None => Err(StoreError::NotFound(snapshot_id.to_string())),
        }
    }

    async fn delete(&self, daemon: &Daemon) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM daemons WHERE id = ?1")
            .bind(&daemon.id)
            .execute(&**self)
            .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Daemon>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_DAEMON} ORDER BY rowid ASC"))
            .fetch_all(&**self)
            .await?;

        rows.iter().map(row_to_daemon).collect()
    }

    fn walk_daemons(&self) -> BoxStream<'_, Result<Daemon, StoreError>> {
        sqlx::query(WALK_DAEMONS)
            .fetch(&**self)
            .map(|row| row.map_err(StoreError::from).and_then(|r| row_to_daemon(&r)))
            .boxed()
    }

    async fn cleanup_database(&self) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM daemons").execute(&**self).await?;
        tracing::info!(removed = result.rows_affected(), "cleaned up daemon database");
        Ok(())
    }
}

fn row_to_daemon(row: &sqlx::sqlite::SqliteRow) -> Result<Daemon, StoreError> {
    let pid = match row.try_get::<Option<i64>, _>("pid")? {
        Some(pid) => Some(
            u32::try_from(pid).map_err(|_| StoreError::Serialization(format!("invalid pid {pid}")))?,
        ),
        None => None,
    };

    Ok(Daemon {
        id: row.try_get("id")?,
        snapshot_id: row.try_get("snapshot_id")?,
        pid,
        shared_daemon: row.try_get::<i64, _>("shared_daemon")? != 0,
        root_mount_point: row
            .try_get::<Option<String>, _>("root_mount_point")?
            .map(PathBuf::from),
        snapshot_dir: PathBuf::from(row.try_get::<String, _>("snapshot_dir")?),
        socket_dir: PathBuf::from(row.try_get::<String, _>("socket_dir")?),
        config_dir: PathBuf::from(row.try_get::<String, _>("config_dir")?),
        log_dir: PathBuf::from(row.try_get::<String, _>("log_dir")?),
        api_socket: row
            .try_get::<Option<String>, _>("api_socket")?
            .map(PathBuf::from),
        logs: None,
    })
}
