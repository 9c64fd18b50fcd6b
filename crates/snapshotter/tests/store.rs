use futures::TryStreamExt;
use snapshotter::daemon::Daemon;
use snapshotter::store::{Database, MemoryStore, Store};

fn record(id: &str, snapshot_id: &str) -> Daemon {
    Daemon::with_id(id, snapshot_id)
        .snapshot_dir("/var/lib/nydus/snapshots")
        .socket_dir("/var/lib/nydus/socket")
        .config_dir("/var/lib/nydus/config")
        .log_dir("/var/lib/nydus/logs")
}

async fn exercise(store: &dyn Store) {
    assert!(store.list().await.unwrap().is_empty());
    assert!(store.get("a").await.unwrap_err().is_not_found());
    assert!(store.get_by_snapshot("snap-a").await.unwrap_err().is_not_found());

    let mut a = record("a", "snap-a");
    a.pid = Some(4242);
    let b = record("b", "snap-b")
        .shared_daemon(true)
        .root_mount_point("/mnt/nydus")
        .api_socket("/var/lib/nydus/socket/shared_daemon/api.sock");
    store.add(&a).await.unwrap();
    store.add(&b).await.unwrap();

    let got = store.get("a").await.unwrap();
    assert_eq!(got.snapshot_id, "snap-a");
    assert_eq!(got.pid, Some(4242));
    assert_eq!(got.socket_dir, a.socket_dir);
    assert!(!got.shared_daemon);
    assert!(got.root_mount_point.is_none());

    let got = store.get_by_snapshot("snap-b").await.unwrap();
    assert_eq!(got.id, "b");
    assert!(got.shared_daemon);
    assert_eq!(got.api_sock(), b.api_sock());
    assert_eq!(got.root_mount_point, b.root_mount_point);

    // add replaces a record with the same id
    a.pid = None;
    store.add(&a).await.unwrap();
    assert_eq!(store.get("a").await.unwrap().pid, None);
    assert_eq!(store.list().await.unwrap().len(), 2);

    let walked: Vec<Daemon> = store.walk_daemons().try_collect().await.unwrap();
    let mut ids: Vec<_> = walked.iter().map(|d| d.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(store.list().await.unwrap().len(), 2);

    store.delete(&a).await.unwrap();
    store.delete(&a).await.unwrap();
    assert!(store.get("a").await.unwrap_err().is_not_found());

    store.cleanup_database().await.unwrap();
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_memory_store_contract() {
    let store = MemoryStore::new();
    exercise(&store).await;
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_sqlite_store_contract() {
    let db = Database::in_memory().await.unwrap();
    exercise(&db).await;
    assert_eq!(db.daemon_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_sqlite_store_survives_reopen() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("nydus.db");

    let db = Database::new(&path).await.unwrap();
    db.add(&record("a", "snap-a")).await.unwrap();
    db.close().await;

    let db = Database::new(&path).await.unwrap();
    let got = db.get("a").await.unwrap();
    assert_eq!(got.snapshot_id, "snap-a");
    assert!(got.logs.is_none());
}

#[tokio::test]
async fn test_memory_store_never_keeps_log_handles() {
    let temp = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();
    let mut d = record("a", "snap-a").log_dir(temp.path());
    d.open_logs().unwrap();

    store.add(&d).await.unwrap();
    assert!(store.get("a").await.unwrap().logs.is_none());
}
