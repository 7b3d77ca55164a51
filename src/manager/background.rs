//! Output collection for running sessions
//!
//! One collector task per launched process consumes its ordered output
//! stream, folds parsed events into the session under the coordinator lock,
//! and settles the session when the process exits.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::progress::{ProgressEvent, TransferAmount, parse_line};
use crate::transport::{ExitOutcome, LaunchMode, ProcessOutput};
use crate::types::identifiers::{SessionId, Ticket};
use crate::types::session::{Direction, PeerProgress, SessionState};

use super::coordinator::Shared;
use super::session::SessionEntry;

/// Spawn the task that drains one process's output into its session
pub(super) fn spawn_output_collector(
    shared: Arc<Shared>,
    session_id: SessionId,
    mut output: mpsc::UnboundedReceiver<ProcessOutput>,
) {
    tokio::spawn(async move {
        while let Some(item) = output.recv().await {
            match item {
                ProcessOutput::Line { text, replay } => {
                    shared.apply_line(&session_id, &text, replay);
                }
                ProcessOutput::Exited(outcome) => {
                    shared.on_process_exit(&session_id, &outcome);
                    break;
                }
            }
        }
        log::trace!("[{session_id}] output collector finished");
    });
}

/// What a batch of applied events requires afterwards
#[derive(Debug, Default)]
struct Applied {
    persist: bool,
    freed_slot: bool,
}

impl Shared {
    /// Parse one line and apply its events in order
    ///
    /// Replayed lines (re-read by the final log read) only contribute a
    /// ticket that was missed earlier.
    pub(super) fn apply_line(self: &Arc<Self>, id: &SessionId, text: &str, replay: bool) {
        log::trace!("[{id}] {text}");

        let applied = {
            let mut state = self.state.lock();
            let Some(entry) = state.sessions.get_mut(id) else {
                return;
            };
            if !entry.accepts_output() {
                return;
            }
            let events = parse_line(text, entry.direction);
            let mut applied = Applied::default();
            for event in events {
                if replay && !matches!(event, ProgressEvent::Ticket(_)) {
                    continue;
                }
                self.apply_event(entry, event, &mut applied);
            }
            applied
        };

        if applied.freed_slot {
            self.pump();
        }
        if applied.persist {
            self.persist();
        }
    }

    fn apply_event(self: &Arc<Self>, entry: &mut SessionEntry, event: ProgressEvent, applied: &mut Applied) {
        match event {
            ProgressEvent::Ticket(token) => {
                if entry.direction != Direction::Send || entry.ticket.is_some() {
                    return;
                }
                log::info!("[{}] ticket captured", entry.id);
                entry.ticket = Some(Ticket::new(token));
                applied.persist = true;

                // A tailed send is ready to download from once it has a ticket
                if entry.launch_mode == Some(LaunchMode::Tail)
                    && entry.state == SessionState::Active
                    && entry.transition(SessionState::Completed)
                {
                    applied.freed_slot = true;
                }
            }
            ProgressEvent::Connected => {
                if !entry.connected {
                    log::debug!("[{}] connected", entry.id);
                }
                entry.connected = true;
            }
            ProgressEvent::Speed(speed) => {
                entry.connected = true;
                entry.speed_text = speed;
            }
            ProgressEvent::Transfer(amount) => self.apply_transfer(entry, &amount),
            ProgressEvent::Peer { peer, amount } => {
                entry.active_peers.insert(
                    peer.clone(),
                    PeerProgress {
                        transferred: amount.transferred,
                        total: amount.total,
                        percent: amount.percent,
                        last_seen: Utc::now(),
                    },
                );
                self.arm_peer_timer(entry, &peer);
            }
        }
    }

    /// Aggregate progress: monotonic while transferring, debounced idle
    fn apply_transfer(self: &Arc<Self>, entry: &mut SessionEntry, amount: &TransferAmount) {
        if !entry.is_transferring || amount.percent >= entry.progress {
            entry.progress = amount.percent;
        }

        // A redraw of the last observed line is not new activity
        let rendered = amount.rendered();
        if rendered == entry.last_rendered {
            return;
        }
        entry.last_rendered.clone_from(&rendered);
        entry.transferred_text = rendered;
        entry.is_transferring = true;
        self.arm_transfer_timer(entry);
    }

    /// Settle a session after its process exited
    pub(super) fn on_process_exit(self: &Arc<Self>, id: &SessionId, outcome: &ExitOutcome) {
        {
            let mut state = self.state.lock();
            let Some(entry) = state.sessions.get_mut(id) else {
                return;
            };
            entry.process = None;

            match entry.state {
                SessionState::Active => {
                    let has_ticket = entry.direction == Direction::Send && entry.ticket.is_some();
                    if outcome.success || has_ticket {
                        entry.transition(SessionState::Completed);
                    } else {
                        log::warn!("[{id}] {}", outcome.describe());
                        entry.error = outcome.describe();
                        entry.transition(SessionState::Failed);
                    }
                }
                SessionState::Completed => {
                    log::info!("[{id}] stopped serving ({})", outcome.describe());
                    entry.clear_transient();
                }
                _ => {
                    log::debug!("[{id}] process exit after {}", entry.state);
                }
            }
        }

        self.pump();
        self.persist();
    }
}
