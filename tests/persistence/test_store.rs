//! Integration tests for session stores and restore
//!
//! Covers the JSON file store and resuming sessions through the manager

#[path = "../common/mod.rs"]
mod common;

use chrono::Utc;
use kodegen_p2p_transfer::{
    Direction, JsonSessionStore, MemorySessionStore, PersistedSession, SendOptions, SessionId,
    SessionState, SessionStore, Ticket, TransferManager,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn record(id: &str, direction: Direction, state: SessionState) -> PersistedSession {
    PersistedSession {
        id: SessionId::new(id),
        direction,
        state,
        ticket: None,
        sources: Vec::new(),
        force_archive: None,
        output_dir: None,
        error: String::new(),
        created_at: Utc::now(),
    }
}

#[test]
fn test_json_store_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let store = JsonSessionStore::new(tmp.path().join("state"));

    assert!(store.load_send_sessions().unwrap().is_empty());
    assert!(store.load_receive_sessions().unwrap().is_empty());

    let mut send = record("s1", Direction::Send, SessionState::Completed);
    send.sources = vec![PathBuf::from("/data/a.txt")];
    send.ticket = Some(Ticket::new(common::TICKET));
    let receive = record("r1", Direction::Receive, SessionState::Failed);

    store.save_send_sessions(std::slice::from_ref(&send)).unwrap();
    store.save_receive_sessions(std::slice::from_ref(&receive)).unwrap();

    assert_eq!(store.load_send_sessions().unwrap(), vec![send]);
    assert_eq!(store.load_receive_sessions().unwrap(), vec![receive]);
    // No temp files left behind
    let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("state"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_corrupt_store_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("send_sessions.json"), "{not json").unwrap();
    let store = JsonSessionStore::new(tmp.path());
    assert!(store.load_send_sessions().is_err());
}

#[tokio::test]
async fn test_manager_saves_after_creation() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let binary = common::fake_binary(tmp.path(), "exec sleep 30");
    let store = Arc::new(MemorySessionStore::new());
    let manager =
        TransferManager::new(common::test_options(tmp.path(), &binary), store.clone()).unwrap();

    let out = tmp.path().join("downloads");
    let id = manager.start_receive(common::TICKET, Some(out.clone())).await.unwrap();

    let saved = store.load_receive_sessions().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].id, id);
    assert_eq!(saved[0].ticket.as_ref().map(Ticket::as_str), Some(common::TICKET));
    assert_eq!(saved[0].output_dir, Some(out));

    manager.remove(&id).await.unwrap();
    assert!(store.load_receive_sessions().unwrap().is_empty());
}

#[tokio::test]
async fn test_restore_reshares_sends_and_requeues_receives() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let binary = common::fake_binary(tmp.path(), "exec sleep 30");
    let source = common::source_file(tmp.path(), "report.pdf", "pdf");

    let mut send = record("old-send", Direction::Send, SessionState::Completed);
    send.sources = vec![source];
    send.ticket = Some(Ticket::new(common::TICKET));
    let cancelled = {
        let mut r = record("old-cancelled", Direction::Send, SessionState::Cancelled);
        r.sources = vec![tmp.path().join("report.pdf")];
        r
    };
    let mut receive = record("old-receive", Direction::Receive, SessionState::Active);
    receive.ticket = Some(Ticket::new(common::TICKET));
    let done = record("old-done", Direction::Receive, SessionState::Completed);

    let store = Arc::new(MemorySessionStore::with_sessions(
        vec![send, cancelled],
        vec![receive, done],
    ));
    let manager =
        TransferManager::new(common::test_options(tmp.path(), &binary), store.clone()).unwrap();
    let report = manager.restore().await.unwrap();

    assert_eq!(report.reshared.len(), 1);
    assert_eq!(report.requeued.len(), 1);
    assert_eq!(report.records.len(), 2);

    let (old, new) = &report.reshared[0];
    assert_eq!(old.as_str(), "old-send");
    assert_ne!(old, new);
    let snapshot = manager.get(new).unwrap();
    // A re-shared send never inherits the old ticket
    assert!(snapshot.ticket.is_none());

    let requeued = common::wait_for(&manager, &report.requeued[0].1, Duration::from_secs(5), |s| {
        s.state == SessionState::Active
    })
    .await;
    assert_eq!(requeued.direction, Direction::Receive);

    let record = manager.get(&SessionId::new("old-cancelled")).unwrap();
    assert_eq!(record.state, SessionState::Cancelled);
    assert_eq!(manager.status().len(), 4);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_ticket_capture_reaches_store_and_survives_shutdown() {
    common::init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let binary = common::fake_binary(
        tmp.path(),
        &format!("echo \"sendme receive {}\"\nexec sleep 30", common::TICKET),
    );
    let store = Arc::new(JsonSessionStore::new(tmp.path().join("state")));
    let manager =
        TransferManager::new(common::test_options(tmp.path(), &binary), store.clone()).unwrap();
    let file = common::source_file(tmp.path(), "notes.md", "# notes");

    let id = manager
        .start_send(vec![file], SendOptions::default())
        .await
        .unwrap();
    common::wait_for(&manager, &id, Duration::from_secs(10), |s| {
        s.state == SessionState::Completed
    })
    .await;
    manager.flush().await;

    let saved = store.load_send_sessions().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].state, SessionState::Completed);
    assert_eq!(saved[0].ticket.as_ref().map(Ticket::as_str), Some(common::TICKET));

    // Stopping the serving process is not recorded
    manager.shutdown().await;
    let saved = store.load_send_sessions().unwrap();
    assert_eq!(saved[0].state, SessionState::Completed);
    assert!(saved[0].error.is_empty());
}
