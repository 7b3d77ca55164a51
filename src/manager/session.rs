//! Session data structures
//!
//! `SessionEntry` is the coordinator-owned record behind every snapshot. It is
//! only ever touched while the coordinator lock is held.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::task::JoinHandle;

use crate::persistence::PersistedSession;
use crate::transport::{LaunchMode, LaunchRequest, ProcessHandle, TransferCommand};
use crate::types::identifiers::{SessionId, Ticket};
use crate::types::options::TransferOptions;
use crate::types::session::{
    Direction, PayloadDescriptor, PeerProgress, SendOptions, SessionSnapshot, SessionState,
};

/// Error recorded on cancelled sessions
pub(crate) const CANCELLED_MESSAGE: &str = "Transfer cancelled";

/// Debounce and peer-idle timers for one session
///
/// Each armed timer carries the generation it was armed with. A firing timer
/// whose generation is stale does nothing, so an abort that races the timer
/// cannot clear fresh state.
#[derive(Debug, Default)]
pub(crate) struct SessionTimers {
    pub transfer: Option<JoinHandle<()>>,
    pub transfer_generation: u64,
    pub peers: HashMap<String, (u64, JoinHandle<()>)>,
    pub peer_generation: u64,
}

impl SessionTimers {
    /// Abort every armed timer
    pub fn cancel_all(&mut self) {
        if let Some(handle) = self.transfer.take() {
            handle.abort();
        }
        for (_, (_, handle)) in self.peers.drain() {
            handle.abort();
        }
        // Invalidate anything already past its sleep
        self.transfer_generation += 1;
        self.peer_generation += 1;
    }
}

/// Internal session data, one per live session
#[derive(Debug)]
pub(crate) struct SessionEntry {
    pub id: SessionId,
    /// Creation order, used for listing and persistence
    pub seq: u64,
    pub direction: Direction,
    pub state: SessionState,
    pub ticket: Option<Ticket>,

    // Send
    pub sources: Vec<PathBuf>,
    pub send_options: SendOptions,
    pub payload: Option<PayloadDescriptor>,
    /// Archive file or batch folder owned by this session
    pub staged_path: Option<PathBuf>,
    pub staging_suffix: Option<String>,
    /// Staging task still running for this session
    pub staging: bool,

    // Receive
    pub output_dir: Option<PathBuf>,

    // Progress
    pub progress: f64,
    pub is_transferring: bool,
    pub connected: bool,
    pub transferred_text: String,
    pub speed_text: String,
    /// Last rendered `transferred / total`, survives idle so repeats don't re-arm
    pub last_rendered: String,
    pub active_peers: HashMap<String, PeerProgress>,
    pub error: String,

    // Process
    pub launch_mode: Option<LaunchMode>,
    pub log_path: Option<PathBuf>,
    pub process: Option<ProcessHandle>,
    pub timers: SessionTimers,

    pub created_at: DateTime<Utc>,
}

impl SessionEntry {
    fn new(id: SessionId, seq: u64, direction: Direction) -> Self {
        Self {
            id,
            seq,
            direction,
            state: SessionState::Pending,
            ticket: None,
            sources: Vec::new(),
            send_options: SendOptions::default(),
            payload: None,
            staged_path: None,
            staging_suffix: None,
            staging: false,
            output_dir: None,
            progress: 0.0,
            is_transferring: false,
            connected: false,
            transferred_text: String::new(),
            speed_text: String::new(),
            last_rendered: String::new(),
            active_peers: HashMap::new(),
            error: String::new(),
            launch_mode: None,
            log_path: None,
            process: None,
            timers: SessionTimers::default(),
            created_at: Utc::now(),
        }
    }

    pub fn new_send(id: SessionId, seq: u64, sources: Vec<PathBuf>, options: SendOptions) -> Self {
        let mut entry = Self::new(id, seq, Direction::Send);
        entry.payload = Some(PayloadDescriptor::Paths {
            paths: sources.clone(),
        });
        entry.sources = sources;
        entry.send_options = options;
        entry
    }

    pub fn new_receive(id: SessionId, seq: u64, ticket: Ticket, output_dir: Option<PathBuf>) -> Self {
        let mut entry = Self::new(id, seq, Direction::Receive);
        entry.ticket = Some(ticket);
        entry.output_dir = output_dir;
        entry
    }

    /// Read-only record of a terminal session loaded from the store
    pub fn from_persisted(record: PersistedSession, seq: u64) -> Self {
        let mut entry = Self::new(record.id, seq, record.direction);
        entry.state = record.state;
        entry.ticket = record.ticket;
        entry.send_options = SendOptions {
            force_archive: record.force_archive,
        };
        if record.direction == Direction::Send {
            entry.payload = Some(PayloadDescriptor::Paths {
                paths: record.sources.clone(),
            });
        }
        entry.sources = record.sources;
        entry.output_dir = record.output_dir;
        entry.error = record.error;
        entry.created_at = record.created_at;
        entry
    }

    /// Move to `next` if the transition is legal
    ///
    /// Terminal transitions clear the transient progress fields and abort
    /// timers. Returns FALSE (and changes nothing) for illegal transitions.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            log::debug!(
                "[{}] ignoring transition {} -> {next}",
                self.id,
                self.state
            );
            return false;
        }
        log::info!("[{}] {} -> {next}", self.id, self.state);
        self.state = next;
        if next.is_terminal() {
            self.clear_transient();
        }
        true
    }

    /// Reset the fields that only make sense while bytes are flowing
    pub fn clear_transient(&mut self) {
        self.is_transferring = false;
        self.transferred_text.clear();
        self.speed_text.clear();
        self.timers.cancel_all();
        if self.process.is_none() {
            self.active_peers.clear();
        }
    }

    /// Whether parsed output may still mutate this session
    ///
    /// Active sessions, plus completed sends still serving peers.
    pub fn accepts_output(&self) -> bool {
        match self.state {
            SessionState::Active => true,
            SessionState::Completed => self.process.is_some(),
            _ => false,
        }
    }

    /// Build the launch request for the payload or ticket, recording the
    /// capture mode and log path on the entry
    pub fn launch_request(&mut self, options: &TransferOptions) -> Option<LaunchRequest> {
        let (command, mode) = match self.direction {
            Direction::Send => {
                let payload = self.payload.as_ref()?;
                let path = payload.transfer_path()?.clone();
                let mode = match payload {
                    PayloadDescriptor::Archive { .. } => LaunchMode::Pipe,
                    _ => LaunchMode::Tail,
                };
                (TransferCommand::Send { payload: path }, mode)
            }
            Direction::Receive => (
                TransferCommand::Receive {
                    ticket: self.ticket.clone()?,
                    output_dir: self.output_dir.clone(),
                },
                LaunchMode::Pipe,
            ),
        };

        let log_path = (mode == LaunchMode::Tail)
            .then(|| options.log_dir().join(format!("{}.log", self.id)));
        self.launch_mode = Some(mode);
        self.log_path.clone_from(&log_path);

        Some(LaunchRequest {
            session_id: self.id.clone(),
            command,
            mode,
            log_path,
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            direction: self.direction,
            state: self.state,
            ticket: self.ticket.clone(),
            payload: self.payload.clone(),
            output_dir: self.output_dir.clone(),
            progress: self.progress,
            is_transferring: self.is_transferring,
            connected: self.connected,
            transferred_text: self.transferred_text.clone(),
            speed_text: self.speed_text.clone(),
            error: self.error.clone(),
            active_peers: self.active_peers.clone(),
            staging_suffix: self.staging_suffix.clone(),
            has_process: self.process.is_some(),
            created_at: self.created_at,
        }
    }

    pub fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            id: self.id.clone(),
            direction: self.direction,
            state: self.state,
            ticket: self.ticket.clone(),
            sources: self.sources.clone(),
            force_archive: self.send_options.force_archive,
            output_dir: self.output_dir.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
        }
    }
}
