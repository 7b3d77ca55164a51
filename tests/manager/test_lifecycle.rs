//! End-to-end tests for `TransferManager`
//!
//! Drive the real launcher against fake transfer binaries written as shell
//! scripts, spawned without a pseudo-terminal.

#[path = "../common/mod.rs"]
mod common;

use common::{TICKET, fake_binary, source_file, test_options, wait_for};
use kodegen_p2p_transfer::{
    PayloadDescriptor, SendOptions, SessionState, TransferError, TransferManager,
};
use std::path::PathBuf;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

fn ticket_then_serve() -> String {
    format!("echo \"to get this data, use\"\necho \"sendme receive {TICKET}\"\nexec sleep 30")
}

#[tokio::test]
async fn test_two_files_archive_then_ticket_while_active() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let binary = fake_binary(tmp.path(), &ticket_then_serve());
    let manager = TransferManager::in_memory(test_options(tmp.path(), &binary)).unwrap();

    let a = source_file(tmp.path(), "a.txt", "alpha");
    let b = source_file(tmp.path(), "b.txt", "beta");
    let id = manager
        .start_send(vec![a.clone(), b], SendOptions::default())
        .await
        .unwrap();

    let snapshot = wait_for(&manager, &id, WAIT, |s| s.ticket.is_some()).await;
    assert_eq!(snapshot.ticket.as_ref().unwrap().as_str(), TICKET);
    // Archive sends are piped and stay active while the process runs
    assert_eq!(snapshot.state, SessionState::Active);
    assert!(snapshot.has_process);
    let Some(PayloadDescriptor::Archive { path: archive }) = snapshot.payload.clone() else {
        panic!("expected archive payload: {snapshot:#?}");
    };
    assert!(archive.is_file());
    assert_eq!(manager.status().len(), 1);
    assert_eq!(std::fs::read_to_string(&a).unwrap(), "alpha");

    manager.remove(&id).await.unwrap();
    assert!(!archive.exists());
    assert!(manager.status().is_empty());
}

#[tokio::test]
async fn test_admission_limit_holds_back_excess_sends() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let binary = fake_binary(tmp.path(), "exec sleep 30");
    let manager = TransferManager::in_memory(test_options(tmp.path(), &binary)).unwrap();
    let file = source_file(tmp.path(), "payload.bin", "bytes");

    let mut ids = Vec::new();
    for _ in 0..12 {
        ids.push(
            manager
                .start_send(vec![file.clone()], SendOptions::default())
                .await
                .unwrap(),
        );
    }

    let states: Vec<SessionState> = manager.status().iter().map(|s| s.state).collect();
    assert_eq!(states.iter().filter(|s| **s == SessionState::Active).count(), 10);
    assert_eq!(states.iter().filter(|s| **s == SessionState::Pending).count(), 2);
    // FIFO: the last two requests are the ones waiting
    assert_eq!(manager.get(&ids[10]).unwrap().state, SessionState::Pending);
    assert_eq!(manager.get(&ids[11]).unwrap().state, SessionState::Pending);

    // Re-running admission while saturated changes nothing
    assert_eq!(manager.pump_admissions(), 0);

    assert_eq!(manager.cancel(Some(&ids[0])).await.unwrap(), 1);
    assert_eq!(manager.get(&ids[10]).unwrap().state, SessionState::Active);
    assert_eq!(manager.get(&ids[11]).unwrap().state, SessionState::Pending);
    assert_eq!(manager.active_count(), 10);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_tailed_send_completes_on_ticket_and_keeps_serving() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let body = format!("{}\n", ticket_then_serve().replace("exec sleep 30", "echo 'a1b2c3d4: 1 MiB / 2 MiB'\nexec sleep 30"));
    let binary = fake_binary(tmp.path(), &body);
    let options = test_options(tmp.path(), &binary);
    let log_dir = options.log_dir();
    let manager = TransferManager::in_memory(options).unwrap();

    let file = source_file(tmp.path(), "movie.mkv", "frames");
    let id = manager
        .start_send(vec![file.clone()], SendOptions::default())
        .await
        .unwrap();

    let snapshot = wait_for(&manager, &id, WAIT, |s| s.state == SessionState::Completed).await;
    assert_eq!(snapshot.ticket.as_ref().unwrap().as_str(), TICKET);
    assert!(snapshot.has_process, "completed send keeps serving");
    assert_eq!(snapshot.payload, Some(PayloadDescriptor::Path { path: file }));
    assert_eq!(manager.active_count(), 0);

    let log_path = log_dir.join(format!("{id}.log"));
    assert!(log_path.is_file());

    manager.remove(&id).await.unwrap();
    assert!(!log_path.exists());
}

#[tokio::test]
async fn test_nonzero_exit_without_ticket_fails() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let binary = fake_binary(tmp.path(), "echo 'error: ticket is invalid' >&2\nexit 3");
    let manager = TransferManager::in_memory(test_options(tmp.path(), &binary)).unwrap();

    let id = manager.start_receive("blobnotreally", None).await.unwrap();
    let snapshot = wait_for(&manager, &id, WAIT, |s| s.state.is_terminal()).await;
    assert_eq!(snapshot.state, SessionState::Failed);
    assert_eq!(snapshot.error, "process exited with code 3");
    assert!(!snapshot.has_process);
}

#[tokio::test]
async fn test_receive_runs_in_output_dir_and_completes() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let body = "echo 'connected to sender'\n\
                echo '12.3 MiB / 45.6 MiB'\n\
                echo \"$2\" > received.txt\n\
                exit 0";
    let binary = fake_binary(tmp.path(), body);
    let manager = TransferManager::in_memory(test_options(tmp.path(), &binary)).unwrap();

    let out = tmp.path().join("downloads");
    let id = manager.start_receive(TICKET, Some(out.clone())).await.unwrap();
    let snapshot = wait_for(&manager, &id, WAIT, |s| s.state.is_terminal()).await;

    assert_eq!(snapshot.state, SessionState::Completed);
    assert!(snapshot.connected);
    assert!((snapshot.progress - 26.97).abs() < 0.01);
    // Terminal sessions drop transient progress text
    assert!(!snapshot.is_transferring);
    assert!(snapshot.transferred_text.is_empty());
    assert_eq!(
        std::fs::read_to_string(out.join("received.txt")).unwrap().trim(),
        TICKET
    );
}

#[tokio::test]
async fn test_cancel_is_final_and_idempotent() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let binary = fake_binary(tmp.path(), "exec sleep 30");
    let options = test_options(tmp.path(), &binary);
    let manager = TransferManager::in_memory(
        kodegen_p2p_transfer::TransferOptions {
            max_concurrent: 1,
            ..options
        },
    )
    .unwrap();

    let active = manager.start_receive(TICKET, None).await.unwrap();
    let pending = manager.start_receive(TICKET, None).await.unwrap();
    assert_eq!(manager.get(&active).unwrap().state, SessionState::Active);
    assert_eq!(manager.get(&pending).unwrap().state, SessionState::Pending);

    assert_eq!(manager.cancel(None).await.unwrap(), 2);
    for id in [&active, &pending] {
        let snapshot = manager.get(id).unwrap();
        assert_eq!(snapshot.state, SessionState::Cancelled);
        assert_eq!(snapshot.error, "Transfer cancelled");
        assert!(!snapshot.has_process);
    }

    // Cancelling again is a no-op, and the killed process never revives state
    assert_eq!(manager.cancel(Some(&active)).await.unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.get(&active).unwrap().state, SessionState::Cancelled);
    assert_eq!(manager.get(&pending).unwrap().state, SessionState::Cancelled);
}

#[tokio::test]
async fn test_remove_releases_suffix_and_batch_folder() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let binary = fake_binary(tmp.path(), "exec sleep 30");
    let options = test_options(tmp.path(), &binary);
    let manager = TransferManager::in_memory(kodegen_p2p_transfer::TransferOptions {
        suffix_pool_size: 1,
        ..options
    })
    .unwrap();

    let a = source_file(tmp.path(), "a.txt", "a");
    let b = source_file(tmp.path(), "b.txt", "b");
    let sources = vec![a, b];

    let first = manager
        .start_send(sources.clone(), SendOptions::no_archive())
        .await
        .unwrap();
    let snapshot = wait_for(&manager, &first, WAIT, |s| s.state == SessionState::Active).await;
    assert_eq!(snapshot.staging_suffix.as_deref(), Some("000"));
    let Some(PayloadDescriptor::BatchFolder { path: folder }) = snapshot.payload else {
        panic!("expected batch folder payload");
    };
    assert!(folder.join("a.txt").is_file());
    assert!(folder.join("b.txt").is_file());

    manager.remove(&first).await.unwrap();
    assert!(!folder.exists());
    assert!(matches!(
        manager.get(&first),
        Err(TransferError::SessionNotFound(_))
    ));

    let second = manager
        .start_send(sources, SendOptions::no_archive())
        .await
        .unwrap();
    let snapshot = manager.get(&second).unwrap();
    assert_eq!(snapshot.staging_suffix.as_deref(), Some("000"));
    manager.shutdown().await;
}

#[tokio::test]
async fn test_reshare_mints_new_session() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let binary = fake_binary(tmp.path(), &ticket_then_serve());
    let manager = TransferManager::in_memory(test_options(tmp.path(), &binary)).unwrap();
    let file = source_file(tmp.path(), "notes.md", "# notes");

    let old = manager
        .start_send(vec![file], SendOptions::default())
        .await
        .unwrap();
    wait_for(&manager, &old, WAIT, |s| s.ticket.is_some()).await;

    let new = manager.reshare(&old).await.unwrap();
    assert_ne!(old, new);
    assert!(manager.get(&old).is_err());
    let snapshot = wait_for(&manager, &new, WAIT, |s| s.ticket.is_some()).await;
    assert_eq!(snapshot.state, SessionState::Completed);

    let receive = manager.start_receive(TICKET, None).await.unwrap();
    assert!(matches!(
        manager.reshare(&receive).await,
        Err(TransferError::InvalidInput(_))
    ));
    manager.shutdown().await;
}

#[tokio::test]
async fn test_vanished_sources_fail_without_spawning() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let binary = fake_binary(tmp.path(), "exec sleep 30");
    let manager = TransferManager::in_memory(test_options(tmp.path(), &binary)).unwrap();

    let id = manager
        .start_send(
            vec![PathBuf::from("/nonexistent/a"), PathBuf::from("/nonexistent/b")],
            SendOptions::default(),
        )
        .await
        .unwrap();
    let snapshot = manager.get(&id).unwrap();
    assert_eq!(snapshot.state, SessionState::Failed);
    assert!(snapshot.error.contains("missing"));
    assert!(!snapshot.has_process);
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test]
async fn test_empty_request_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let binary = fake_binary(tmp.path(), "exit 0");
    let manager = TransferManager::in_memory(test_options(tmp.path(), &binary)).unwrap();

    assert!(matches!(
        manager.start_send(Vec::new(), SendOptions::default()).await,
        Err(TransferError::InvalidInput(_))
    ));
    assert!(matches!(
        manager.start_receive("  ", None).await,
        Err(TransferError::InvalidInput(_))
    ));
    assert!(manager.status().is_empty());
}

#[tokio::test]
async fn test_missing_binary_fails_session() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("no-such-binary");
    let manager = TransferManager::in_memory(test_options(tmp.path(), &missing)).unwrap();

    let id = manager.start_receive(TICKET, None).await.unwrap();
    let snapshot = manager.get(&id).unwrap();
    assert_eq!(snapshot.state, SessionState::Failed);
    assert!(!snapshot.error.is_empty());
}

/// Directory holding `count` small files, slow enough to link that staging
/// is still running when the test acts on the session
fn large_tree(root: &std::path::Path, name: &str, count: usize) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    for i in 0..count {
        std::fs::write(dir.join(format!("f{i:05}.txt")), "x").unwrap();
    }
    dir
}

/// Names of `batch_*` folders once the count has stayed put for a while
async fn settled_batches(dir: &std::path::Path) -> Vec<String> {
    let list = || -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("batch_"))
            .collect();
        names.sort();
        names
    };

    let deadline = tokio::time::Instant::now() + WAIT;
    let mut last = list();
    let mut stable = 0;
    while stable < 25 {
        assert!(tokio::time::Instant::now() < deadline, "batch folders never settled");
        tokio::time::sleep(Duration::from_millis(20)).await;
        let now = list();
        stable = if now == last { stable + 1 } else { 0 };
        last = now;
    }
    last
}

#[tokio::test]
async fn test_remove_while_staging_leaves_no_batch_folder() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let binary = fake_binary(tmp.path(), "exec sleep 30");
    let manager = TransferManager::in_memory(test_options(tmp.path(), &binary)).unwrap();
    let tree = large_tree(tmp.path(), "tree", 2000);
    let extra = source_file(tmp.path(), "extra.txt", "extra");

    let id = manager
        .start_send(vec![tree.clone(), extra], SendOptions::no_archive())
        .await
        .unwrap();
    manager.remove(&id).await.unwrap();
    assert!(manager.get(&id).is_err());

    let batch_dir = manager.options().batch_dir();
    assert!(settled_batches(&batch_dir).await.is_empty());
    // Originals untouched
    assert_eq!(std::fs::read_dir(&tree).unwrap().count(), 2000);
    assert!(manager.status().is_empty());
}

#[tokio::test]
async fn test_new_batch_survives_removed_staging_with_same_pool() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let binary = fake_binary(tmp.path(), "exec sleep 30");
    let options = test_options(tmp.path(), &binary);
    let manager = TransferManager::in_memory(kodegen_p2p_transfer::TransferOptions {
        suffix_pool_size: 1,
        ..options
    })
    .unwrap();
    let tree = large_tree(tmp.path(), "tree", 2000);
    let extra = source_file(tmp.path(), "extra.txt", "extra");
    let a = source_file(tmp.path(), "a.txt", "a");
    let b = source_file(tmp.path(), "b.txt", "b");

    let removed = manager
        .start_send(vec![tree, extra], SendOptions::no_archive())
        .await
        .unwrap();
    manager.remove(&removed).await.unwrap();

    let live = manager
        .start_send(vec![a, b], SendOptions::no_archive())
        .await
        .unwrap();
    let snapshot = wait_for(&manager, &live, WAIT, |s| s.state == SessionState::Active).await;
    let Some(PayloadDescriptor::BatchFolder { path: folder }) = snapshot.payload else {
        panic!("expected batch folder payload");
    };

    // Whatever suffix the live batch drew, the removed one must not take it down
    let batch_dir = manager.options().batch_dir();
    let remaining = settled_batches(&batch_dir).await;
    assert_eq!(remaining.len(), 1);
    assert!(folder.join("a.txt").is_file());
    assert!(folder.join("b.txt").is_file());
    manager.shutdown().await;
}

#[tokio::test]
async fn test_launch_failures_drain_the_whole_queue() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let binary = fake_binary(tmp.path(), "exec sleep 30");
    let options = test_options(tmp.path(), &binary);
    let manager = TransferManager::in_memory(kodegen_p2p_transfer::TransferOptions {
        max_concurrent: 1,
        ..options
    })
    .unwrap();

    let running = manager.start_receive(TICKET, None).await.unwrap();
    let mut queued = Vec::new();
    for _ in 0..50 {
        queued.push(manager.start_receive(TICKET, None).await.unwrap());
    }
    assert_eq!(manager.active_count(), 1);
    assert_eq!(manager.queued_count(), 50);

    // Every queued launch now fails; freeing the slot must fail them all
    std::fs::remove_file(&binary).unwrap();
    assert_eq!(manager.cancel(Some(&running)).await.unwrap(), 1);

    assert_eq!(manager.queued_count(), 0);
    assert_eq!(manager.active_count(), 0);
    for id in &queued {
        let snapshot = manager.get(id).unwrap();
        assert_eq!(snapshot.state, SessionState::Failed);
        assert!(!snapshot.error.is_empty());
    }
}
