//! Session creation
//!
//! Handles `start_send` (staging, then queueing) and `start_receive`.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Result, TransferError};
use crate::staging::{
    PlanKind, StagingPlan, archive_base_name, decide, existing_sources, remove_dir_quietly,
    remove_file_quietly,
};
use crate::types::identifiers::{SessionId, Ticket};
use crate::types::session::{PayloadDescriptor, SendOptions, SessionState};

use super::super::coordinator::Shared;
use super::super::session::SessionEntry;
use super::core::TransferManager;

// ============================================================================
// SEND
// ============================================================================

impl TransferManager {
    /// Start a send session for one or more source paths
    ///
    /// Returns the new session id immediately. Staging runs in the
    /// background; a staging failure leaves a `failed` session rather than an
    /// error. A request whose sources have all vanished yields a `failed`
    /// session as well.
    ///
    /// # Errors
    /// Returns `InvalidInput` if `sources` is empty
    pub async fn start_send(&self, sources: Vec<PathBuf>, options: SendOptions) -> Result<SessionId> {
        if sources.is_empty() {
            return Err(TransferError::invalid_input("at least one source path is required"));
        }

        let shared = &self.shared;
        let id = SessionId::generate();
        let existing = existing_sources(&sources);
        let kind = decide(&existing, options);

        let plan = {
            let mut state = shared.state.lock();
            let seq = state.next_seq();
            let mut entry = SessionEntry::new_send(id.clone(), seq, sources, options);

            let plan = if existing.is_empty() {
                entry.error = "all source files are missing".to_string();
                entry.transition(SessionState::Failed);
                None
            } else {
                match kind {
                    PlanKind::AsIs => {
                        entry.payload = Some(PayloadDescriptor::Path {
                            path: existing[0].clone(),
                        });
                        state.queue.enqueue(id.clone());
                        None
                    }
                    PlanKind::Archive => Some(StagingPlan::Archive {
                        base: archive_base_name(&existing),
                        sources: existing,
                        dir: shared.options.archive_dir(),
                        attempts: shared.options.archive_name_attempts,
                    }),
                    PlanKind::BatchFolder => {
                        let suffix = state.suffixes.allocate();
                        let folder = shared.options.batch_dir().join(format!("batch_{suffix}"));
                        entry.staging_suffix = Some(suffix);
                        entry.staged_path = Some(folder.clone());
                        Some(StagingPlan::BatchFolder {
                            sources: existing,
                            folder,
                        })
                    }
                }
            };
            entry.staging = plan.is_some();

            log::info!("[{id}] send created ({} sources)", entry.sources.len());
            state.sessions.insert(id.clone(), entry);
            plan
        };

        shared.persist();
        match plan {
            Some(plan) => spawn_staging(Arc::clone(shared), id.clone(), plan),
            None => {
                shared.pump();
            }
        }
        shared.flush().await;
        Ok(id)
    }

    // ========================================================================
    // RECEIVE
    // ========================================================================

    /// Start a receive session for `ticket`
    ///
    /// The payload is written into `output_dir` (created if missing), or the
    /// current directory when `None`.
    ///
    /// # Errors
    /// Returns `InvalidInput` for an empty ticket or an output directory that
    /// cannot be created
    pub async fn start_receive(&self, ticket: &str, output_dir: Option<PathBuf>) -> Result<SessionId> {
        let ticket = ticket.trim();
        if ticket.is_empty() {
            return Err(TransferError::invalid_input("ticket must not be empty"));
        }
        if let Some(dir) = &output_dir {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                TransferError::invalid_input(format!(
                    "cannot create output directory {}: {e}",
                    dir.display()
                ))
            })?;
        }

        let id = SessionId::generate();
        {
            let mut state = self.shared.state.lock();
            let seq = state.next_seq();
            let entry = SessionEntry::new_receive(id.clone(), seq, Ticket::new(ticket), output_dir);
            state.sessions.insert(id.clone(), entry);
            state.queue.enqueue(id.clone());
        }
        log::info!("[{id}] receive created");

        self.shared.persist();
        self.shared.pump();
        self.shared.flush().await;
        Ok(id)
    }
}

// ============================================================================
// STAGING
// ============================================================================

/// Staged output of a session that was removed before staging finished
struct StagingOrphan {
    payload: Option<PayloadDescriptor>,
    suffix: Option<String>,
}

/// Run a staging plan off the coordinator, then hand the result back
fn spawn_staging(shared: Arc<Shared>, id: SessionId, plan: StagingPlan) {
    tokio::spawn(async move {
        log::debug!("[{id}] staging started");
        let result = tokio::task::spawn_blocking(move || plan.execute())
            .await
            .unwrap_or_else(|e| Err(TransferError::staging(format!("staging task failed: {e}"))));
        if let Some(orphan) = shared.on_staged(&id, result) {
            shared.discard_orphan(&id, orphan).await;
        }
    });
}

impl Shared {
    /// Queue a staged session, or fail it
    ///
    /// A session cancelled during staging keeps its artifacts until removal.
    /// One removed during staging is returned as an orphan for cleanup.
    fn on_staged(
        self: &Arc<Self>,
        id: &SessionId,
        result: Result<PayloadDescriptor>,
    ) -> Option<StagingOrphan> {
        {
            let mut state = self.state.lock();
            let state = &mut *state;
            let Some(entry) = state.sessions.get_mut(id) else {
                return Some(StagingOrphan {
                    payload: result.ok(),
                    suffix: state.staging_orphans.remove(id).flatten(),
                });
            };
            entry.staging = false;

            match result {
                Ok(payload) => {
                    log::debug!("[{id}] staged {payload:?}");
                    entry.staged_path = payload.staged_path().cloned();
                    entry.payload = Some(payload);
                    if entry.state == SessionState::Pending {
                        state.queue.enqueue(id.clone());
                    }
                }
                Err(e) if entry.state == SessionState::Pending => {
                    log::warn!("[{id}] staging failed: {e}");
                    entry.staged_path = None;
                    entry.error = e.to_string();
                    entry.transition(SessionState::Failed);
                }
                Err(e) => {
                    log::debug!("[{id}] staging failed after {}: {e}", entry.state);
                    entry.staged_path = None;
                }
            }
        }

        self.persist();
        self.pump();
        None
    }

    /// Delete what a removed session's staging produced, then free its suffix
    ///
    /// The suffix stays reserved until the folder is gone so a new batch
    /// cannot be handed the same path while the old one is still on disk.
    async fn discard_orphan(&self, id: &SessionId, orphan: StagingOrphan) {
        log::debug!("[{id}] session removed during staging, discarding payload");
        if let Some(payload) = orphan.payload {
            let result = tokio::task::spawn_blocking(move || match payload {
                PayloadDescriptor::Archive { path } => remove_file_quietly(&path),
                PayloadDescriptor::BatchFolder { path } => remove_dir_quietly(&path),
                PayloadDescriptor::Path { .. } | PayloadDescriptor::Paths { .. } => {}
            })
            .await;
            if let Err(e) = result {
                log::warn!("[{id}] orphan cleanup failed: {e}");
            }
        }
        if let Some(suffix) = orphan.suffix
            && !self.state.lock().suffixes.release(&suffix)
        {
            log::warn!("[{id}] suffix {suffix} was not reserved");
        }
    }
}
