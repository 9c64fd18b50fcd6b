//! Process supervision against real short-lived processes.
//!
//! Kept in one test so no other test thread forks while the fake nydusd
//! script is open for writing.

mod common;

use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

use common::Harness;
use snapshotter::Manager;

#[tokio::test]
async fn test_start_and_destroy_real_processes() {
    let h = Harness::new(true);

    // an executable that stays up until killed
    let script = h.root.path().join("fake-nydusd");
    std::fs::write(&script, "#!/bin/sh\necho \"fake nydusd $*\" >&2\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let manager = Manager::builder()
        .store(h.store.clone())
        .mounter(h.mounter.clone())
        .client(h.client.clone())
        .nydusd_path(&script)
        .shared_daemon(true)
        .build();
    let mut exits = manager.subscribe_exits();

    // tracked process: killed, then the supervision task is joined
    let mut d = h.sentinel();
    d.open_logs().unwrap();
    manager.start(&mut d).await.unwrap();
    let pid = d.pid.expect("start assigns a pid");
    assert!(pid > 0);
    manager.register(&d).await.unwrap();

    let log_file = d.log_file();
    let mut logged = String::new();
    for _ in 0..100 {
        logged = std::fs::read_to_string(&log_file).unwrap_or_default();
        if !logged.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(logged.contains("fake nydusd --apisock"));
    assert!(logged.contains("--mountpoint"));

    manager.shutdown_shared_daemon().await.unwrap();

    let exit = tokio::time::timeout(Duration::from_secs(5), exits.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit.daemon_id, snapshotter::SHARED_DAEMON_ID);
    // killed by a signal
    assert_eq!(exit.status, None);
    assert!(nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_err());

    // untracked process: reaped through its pid alone
    let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
    let mut untracked = h.record("untracked", "snap-untracked");
    untracked.pid = Some(child.id());
    manager.register(&untracked).await.unwrap();

    tokio::time::timeout(
        Duration::from_secs(5),
        manager.destroy_by_snapshot_id("snap-untracked"),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(nix::sys::signal::kill(nix::unistd::Pid::from_raw(child.id() as i32), None).is_err());
}
