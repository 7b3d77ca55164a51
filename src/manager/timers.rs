//! Debounce and peer-idle timers
//!
//! Timers are plain tokio tasks that sleep, then re-enter the coordinator.
//! They hold only a weak reference so a dropped manager never gets revived.

use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::types::identifiers::SessionId;

use super::coordinator::Shared;
use super::session::SessionEntry;

impl Shared {
    /// (Re)arm the `is_transferring` debounce for `entry`
    pub(super) fn arm_transfer_timer(self: &Arc<Self>, entry: &mut SessionEntry) {
        let timers = &mut entry.timers;
        if let Some(handle) = timers.transfer.take() {
            handle.abort();
        }
        timers.transfer_generation += 1;
        let generation = timers.transfer_generation;

        let weak = Arc::downgrade(self);
        let id = entry.id.clone();
        timers.transfer = Some(spawn_timer(self.options.transfer_idle, move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_transfer_idle(&id, generation);
            }
        }));
    }

    /// (Re)arm the idle timer of one downloading peer
    pub(super) fn arm_peer_timer(self: &Arc<Self>, entry: &mut SessionEntry, peer: &str) {
        let timers = &mut entry.timers;
        if let Some((_, handle)) = timers.peers.remove(peer) {
            handle.abort();
        }
        timers.peer_generation += 1;
        let generation = timers.peer_generation;

        let weak: Weak<Self> = Arc::downgrade(self);
        let id = entry.id.clone();
        let key = peer.to_string();
        let handle = spawn_timer(self.options.peer_idle, move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_peer_idle(&id, &key, generation);
            }
        });
        timers.peers.insert(peer.to_string(), (generation, handle));
    }

    fn on_transfer_idle(&self, id: &SessionId, generation: u64) {
        let mut state = self.state.lock();
        let Some(entry) = state.sessions.get_mut(id) else {
            return;
        };
        if entry.timers.transfer_generation != generation {
            return;
        }
        entry.timers.transfer = None;
        entry.is_transferring = false;
        entry.transferred_text.clear();
        entry.speed_text.clear();
        log::debug!("[{id}] transfer idle");
    }

    fn on_peer_idle(&self, id: &SessionId, peer: &str, generation: u64) {
        let mut state = self.state.lock();
        let Some(entry) = state.sessions.get_mut(id) else {
            return;
        };
        if !matches!(entry.timers.peers.get(peer), Some((armed, _)) if *armed == generation) {
            return;
        }
        entry.timers.peers.remove(peer);
        entry.active_peers.remove(peer);
        log::debug!("[{id}] peer {peer} went idle");
    }
}

fn spawn_timer<F>(delay: Duration, on_fire: F) -> tokio::task::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        on_fire();
    })
}
