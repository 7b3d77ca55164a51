//! Session control: cancel, remove and re-share

use std::path::PathBuf;

use crate::error::{Result, TransferError};
use crate::staging::{remove_dir_quietly, remove_file_quietly};
use crate::types::identifiers::SessionId;
use crate::types::session::{Direction, SessionState};

use super::super::session::CANCELLED_MESSAGE;
use super::core::TransferManager;

impl TransferManager {
    /// Cancel one session, or every pending and active one when `id` is `None`
    ///
    /// The state is `cancelled` before any kill signal is sent, and the call
    /// returns once every kill has been dispatched. Cancelling a session that
    /// already finished is a no-op. Returns the number of sessions cancelled.
    ///
    /// # Errors
    /// Returns `SessionNotFound` if `id` names an unknown session
    pub async fn cancel(&self, id: Option<&SessionId>) -> Result<usize> {
        let (cancelled, handles) = {
            let mut state = self.shared.state.lock();
            let state = &mut *state;

            let targets: Vec<SessionId> = match id {
                Some(id) => {
                    if !state.sessions.contains_key(id) {
                        return Err(TransferError::session_not_found(id.as_str()));
                    }
                    vec![id.clone()]
                }
                None => state
                    .sessions
                    .values()
                    .filter(|s| !s.state.is_terminal())
                    .map(|s| s.id.clone())
                    .collect(),
            };

            let mut cancelled = 0;
            let mut handles = Vec::new();
            for target in targets {
                let Some(entry) = state.sessions.get_mut(&target) else {
                    continue;
                };
                if entry.state.is_terminal() {
                    continue;
                }
                state.queue.remove(&target);
                if let Some(handle) = entry.process.take() {
                    handles.push(handle);
                }
                entry.error = CANCELLED_MESSAGE.to_string();
                entry.transition(SessionState::Cancelled);
                cancelled += 1;
            }
            (cancelled, handles)
        };

        futures::future::join_all(handles.into_iter().map(|h| h.kill())).await;

        if cancelled > 0 {
            self.shared.pump();
            self.shared.persist();
            self.shared.flush().await;
        }
        Ok(cancelled)
    }

    /// Remove a session entirely
    ///
    /// Kills its process if one is attached, releases its batch suffix and
    /// deletes its staged archive or batch folder and its tail log. For a
    /// session still staging, the staging task deletes its output and
    /// releases the suffix once it finishes.
    ///
    /// # Errors
    /// Returns `SessionNotFound` for an unknown id
    pub async fn remove(&self, id: &SessionId) -> Result<()> {
        let mut entry = {
            let mut state = self.shared.state.lock();
            let mut entry = state
                .sessions
                .remove(id)
                .ok_or_else(|| TransferError::session_not_found(id.as_str()))?;
            state.queue.remove(id);
            if entry.staging {
                // Staging still writes under the suffix; it cleans up and releases
                state
                    .staging_orphans
                    .insert(id.clone(), entry.staging_suffix.take());
                entry.staged_path = None;
            } else if let Some(suffix) = entry.staging_suffix.take()
                && !state.suffixes.release(&suffix)
            {
                log::warn!("[{id}] suffix {suffix} was not reserved");
            }
            entry
        };
        entry.timers.cancel_all();
        log::info!("[{id}] removing {} session", entry.state);

        if let Some(handle) = entry.process.take() {
            handle.kill().await;
        }

        let staged = entry.staged_path.take();
        let log_path = entry.log_path.take();
        cleanup_artifacts(staged, log_path).await;

        self.shared.pump();
        self.shared.persist();
        self.shared.flush().await;
        Ok(())
    }

    /// Stop a send and share its original sources again as a new session
    ///
    /// The old session is removed (its suffix released) and a fresh one
    /// with a new id, new staging and eventually a new ticket takes its place.
    ///
    /// # Errors
    /// Returns `SessionNotFound` for an unknown id and `InvalidInput` for a
    /// receive session
    pub async fn reshare(&self, id: &SessionId) -> Result<SessionId> {
        let (sources, options) = {
            let state = self.shared.state.lock();
            let entry = state
                .sessions
                .get(id)
                .ok_or_else(|| TransferError::session_not_found(id.as_str()))?;
            if entry.direction != Direction::Send {
                return Err(TransferError::invalid_input("only send sessions can be re-shared"));
            }
            (entry.sources.clone(), entry.send_options)
        };

        self.remove(id).await?;
        let new_id = self.start_send(sources, options).await?;
        log::info!("[{id}] re-shared as {new_id}");
        Ok(new_id)
    }
}

/// Delete a session's staged payload and tail log off the runtime threads
async fn cleanup_artifacts(staged: Option<PathBuf>, log_path: Option<PathBuf>) {
    if staged.is_none() && log_path.is_none() {
        return;
    }
    let result = tokio::task::spawn_blocking(move || {
        if let Some(path) = staged {
            if path.is_dir() {
                remove_dir_quietly(&path);
            } else {
                remove_file_quietly(&path);
            }
        }
        if let Some(path) = log_path {
            remove_file_quietly(&path);
        }
    })
    .await;
    if let Err(e) = result {
        log::warn!("cleanup task failed: {e}");
    }
}
