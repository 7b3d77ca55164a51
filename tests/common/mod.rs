//! Shared helpers: fake transfer binaries and manager options

#![allow(dead_code)]

use kodegen_p2p_transfer::{SessionId, SessionSnapshot, TerminalWrapper, TransferManager, TransferOptions};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A ticket-shaped token
pub const TICKET: &str = "blobaaaabbbbccccddddeeeeffff00001111222233334444";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Write an executable `sh` script standing in for the transfer binary
///
/// The script sees the same arguments the real binary would:
/// `send <path> -v` or `receive <ticket> -v`.
pub fn fake_binary(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-sendme");
    let staging = dir.join("fake-sendme.partial");
    fs::write(&staging, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&staging, fs::Permissions::from_mode(0o755)).unwrap();
    fs::rename(&staging, &path).unwrap();
    path
}

/// Fast timers, direct spawn, everything under `root`
pub fn test_options(root: &Path, binary: &Path) -> TransferOptions {
    TransferOptions::builder()
        .binary_path(binary)
        .staging_dir(root.join("staging"))
        .terminal_wrapper(TerminalWrapper::None)
        .tail_poll_interval(Duration::from_millis(20))
        .transfer_idle(Duration::from_millis(200))
        .peer_idle(Duration::from_millis(200))
        .build()
}

/// Poll `get(id)` until `check` holds or `timeout` passes
pub async fn wait_for<F>(
    manager: &TransferManager,
    id: &SessionId,
    timeout: Duration,
    mut check: F,
) -> SessionSnapshot
where
    F: FnMut(&SessionSnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let snapshot = manager.get(id).unwrap();
        if check(&snapshot) {
            return snapshot;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for session {id}: {snapshot:#?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Create a file with some content and return its path
pub fn source_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}
