//! Session listing

use crate::error::{Result, TransferError};
use crate::types::identifiers::SessionId;
use crate::types::session::SessionSnapshot;

use super::core::TransferManager;

impl TransferManager {
    /// Snapshots of every session in creation order
    #[must_use]
    pub fn status(&self) -> Vec<SessionSnapshot> {
        let state = self.shared.state.lock();
        state.ordered().into_iter().map(|s| s.snapshot()).collect()
    }

    /// Snapshot of one session
    ///
    /// # Errors
    /// Returns `SessionNotFound` for an unknown id
    pub fn get(&self, id: &SessionId) -> Result<SessionSnapshot> {
        let state = self.shared.state.lock();
        state
            .sessions
            .get(id)
            .map(|s| s.snapshot())
            .ok_or_else(|| TransferError::session_not_found(id.as_str()))
    }

    /// Number of sessions currently holding a slot
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().active_count()
    }

    /// Number of sessions waiting for a slot
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }
}
