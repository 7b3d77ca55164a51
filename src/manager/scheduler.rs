//! Admission queue
//!
//! Strict FIFO of pending sessions with a fixed ceiling on active ones.

use std::collections::VecDeque;

use crate::types::identifiers::SessionId;

/// FIFO of sessions waiting for an active slot
#[derive(Debug, Default)]
pub(crate) struct AdmissionQueue {
    pending: VecDeque<SessionId>,
}

impl AdmissionQueue {
    /// Append a session to the back of the queue
    pub fn enqueue(&mut self, id: SessionId) {
        if !self.pending.contains(&id) {
            self.pending.push_back(id);
        }
    }

    /// Drop a session from the queue (cancel/remove)
    pub fn remove(&mut self, id: &SessionId) {
        self.pending.retain(|queued| queued != id);
    }

    /// Number of queued sessions
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Pop the oldest sessions that fit under `limit`
    ///
    /// `is_admissible` filters out ids that stopped being pending; those are
    /// discarded without using a slot. Calling this with an empty queue or a
    /// saturated limit changes nothing.
    pub fn admit<F>(&mut self, active: usize, limit: usize, mut is_admissible: F) -> Vec<SessionId>
    where
        F: FnMut(&SessionId) -> bool,
    {
        let mut admitted = Vec::new();
        while active + admitted.len() < limit {
            let Some(id) = self.pending.pop_front() else {
                break;
            };
            if is_admissible(&id) {
                admitted.push(id);
            } else {
                log::trace!("[{id}] dropped stale queue entry");
            }
        }
        admitted
    }
}
