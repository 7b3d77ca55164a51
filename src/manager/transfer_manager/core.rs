//! Core transfer manager structure and lifecycle management
//!
//! Provides the main `TransferManager` struct with initialization and shutdown.

use std::fs;
use std::sync::Arc;

use crate::error::{Result, TransferError};
use crate::persistence::{MemorySessionStore, SessionStore};
use crate::types::options::TransferOptions;
use crate::types::session::SessionState;

use super::super::coordinator::Shared;
use super::super::session::CANCELLED_MESSAGE;

// ============================================================================
// TRANSFER MANAGER CORE
// ============================================================================

/// Manager for concurrent peer-to-peer transfer sessions
///
/// The `TransferManager` coordinates send and receive sessions, handling:
/// - Payload staging (archive, batch folder, as-is)
/// - FIFO admission under a concurrency limit
/// - Process launch, output capture and progress tracking
/// - Cancellation, removal and cleanup of staged artifacts
/// - Persistence of the session lists after every change
///
/// Cloning is cheap; clones share the same sessions.
#[derive(Clone)]
pub struct TransferManager {
    pub(super) shared: Arc<Shared>,
}

impl TransferManager {
    /// Create a manager persisting to `store`
    ///
    /// Creates the staging directories. Nothing is restored automatically;
    /// call [`TransferManager::restore`] for that.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for invalid options, or an I/O error if the
    /// staging directories cannot be created
    pub fn new(options: TransferOptions, store: Arc<dyn SessionStore>) -> Result<Self> {
        options.validate()?;
        for dir in [options.archive_dir(), options.batch_dir(), options.log_dir()] {
            fs::create_dir_all(&dir).map_err(|e| {
                TransferError::invalid_config(format!("cannot create {}: {e}", dir.display()))
            })?;
        }
        log::debug!(
            "TransferManager ready (max_concurrent={}, staging={})",
            options.max_concurrent,
            options.staging_dir.display()
        );

        Ok(Self {
            shared: Arc::new(Shared::new(options, store)),
        })
    }

    /// Create a manager that keeps its session lists in memory
    ///
    /// # Errors
    /// Same as [`TransferManager::new`]
    pub fn in_memory(options: TransferOptions) -> Result<Self> {
        Self::new(options, Arc::new(MemorySessionStore::new()))
    }

    /// Options the manager was created with
    #[must_use]
    pub fn options(&self) -> &TransferOptions {
        &self.shared.options
    }

    /// Re-run admission; returns the number of sessions promoted
    ///
    /// Admission already runs on every creation and terminal transition, so
    /// callers rarely need this. Calling it with nothing to admit is a no-op.
    pub fn pump_admissions(&self) -> usize {
        self.shared.pump()
    }

    /// Wait until the store holds the session lists as they stand now
    ///
    /// Background events (ticket capture, process exit) are saved without
    /// waiting; call this before exiting to make sure they landed.
    pub async fn flush(&self) {
        self.shared.flush().await;
    }

    /// Gracefully shut down the manager
    ///
    /// Persists the lists as they stand, then cancels every pending and
    /// active session and stops completed sends that are still serving.
    /// The cancellations are not persisted, so a later
    /// [`TransferManager::restore`] resumes what was running.
    pub async fn shutdown(&self) {
        log::info!("Shutting down TransferManager...");
        self.shared.persist();
        self.shared.flush().await;
        if !self.shared.close() {
            log::debug!("TransferManager already shut down");
            return;
        }

        let handles: Vec<_> = {
            let mut state = self.shared.state.lock();
            let state = &mut *state;
            state
                .sessions
                .values_mut()
                .filter_map(|entry| {
                    let handle = entry.process.take();
                    if !entry.state.is_terminal() {
                        state.queue.remove(&entry.id);
                        entry.error = CANCELLED_MESSAGE.to_string();
                        entry.transition(SessionState::Cancelled);
                    } else {
                        entry.clear_transient();
                    }
                    handle
                })
                .collect()
        };

        log::debug!("Killing {} transfer processes", handles.len());
        futures::future::join_all(handles.into_iter().map(|h| h.kill())).await;

        log::info!("TransferManager shutdown complete");
    }
}
