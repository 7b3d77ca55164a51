//! Transfer session types
//!
//! Public, serializable views of a transfer session: direction, lifecycle
//! state, payload shape, per-peer progress and the status snapshot handed
//! to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use super::identifiers::{SessionId, Ticket};

// ============================================================================
// Direction & State
// ============================================================================

/// Which side of the transfer this session drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local files are offered to peers holding the ticket
    Send,
    /// A remote payload is fetched using a ticket
    Receive,
}

/// Session lifecycle state
///
/// Legal paths: `pending -> active -> {completed | failed | cancelled}`,
/// `pending -> {failed | cancelled}`. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Waiting for staging or an admission slot
    Pending,
    /// Owns a running transfer process and a scheduler slot
    Active,
    /// Process exited successfully, or a send captured its ticket
    Completed,
    /// Staging, spawn or the process itself failed
    Failed,
    /// Cancelled by the caller
    Cancelled,
}

impl SessionState {
    /// Whether no further transitions are possible
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal transition
    #[must_use]
    pub fn can_transition_to(self, next: SessionState) -> bool {
        match (self, next) {
            (Self::Pending, Self::Active) => true,
            (Self::Pending, Self::Failed | Self::Cancelled) => true,
            (Self::Active, Self::Completed | Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Payload
// ============================================================================

/// What a session transfers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadDescriptor {
    /// A single source sent as-is
    Path {
        /// Source path
        path: PathBuf,
    },
    /// Requested sources, before planning has run
    Paths {
        /// Source paths in request order
        paths: Vec<PathBuf>,
    },
    /// Sources compressed into one staged archive
    Archive {
        /// Staged archive file
        path: PathBuf,
    },
    /// Sources hard-linked into a staged batch folder
    BatchFolder {
        /// Staged batch folder
        path: PathBuf,
    },
}

impl PayloadDescriptor {
    /// Path handed to the transfer binary, if planning has completed
    #[must_use]
    pub fn transfer_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Path { path } | Self::Archive { path } | Self::BatchFolder { path } => {
                Some(path)
            }
            Self::Paths { .. } => None,
        }
    }

    /// Archive or batch folder created by staging, owned by the session
    #[must_use]
    pub fn staged_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Archive { path } | Self::BatchFolder { path } => Some(path),
            Self::Path { .. } | Self::Paths { .. } => None,
        }
    }
}

/// Options accepted by `start_send`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    /// `Some(true)` forces an archive, `Some(false)` asks for a batch folder
    /// when several sources are given, `None` lets the planner decide.
    pub force_archive: Option<bool>,
}

impl SendOptions {
    /// Always archive
    #[must_use]
    pub fn archive() -> Self {
        Self {
            force_archive: Some(true),
        }
    }

    /// Never archive; multiple sources become a batch folder
    #[must_use]
    pub fn no_archive() -> Self {
        Self {
            force_archive: Some(false),
        }
    }
}

// ============================================================================
// Progress & Snapshots
// ============================================================================

/// Progress of one remote peer downloading from a send session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerProgress {
    /// Human-readable transferred amount
    pub transferred: String,
    /// Human-readable total size
    pub total: String,
    /// Percentage in `0..=100`
    pub percent: f64,
    /// When the peer was last observed
    pub last_seen: DateTime<Utc>,
}

/// Status snapshot of one session handed to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Unique identifier for the session
    pub id: SessionId,

    /// Send or receive
    pub direction: Direction,

    /// Lifecycle state
    pub state: SessionState,

    /// Connection ticket, `None` until emitted (send) or as supplied (receive)
    pub ticket: Option<Ticket>,

    /// Requested or staged payload (send only)
    pub payload: Option<PayloadDescriptor>,

    /// Download directory (receive only)
    pub output_dir: Option<PathBuf>,

    /// Progress in `0..=100`
    pub progress: f64,

    /// TRUE while progress text keeps changing
    pub is_transferring: bool,

    /// TRUE once the binary reported a connection
    pub connected: bool,

    /// Last transferred/total text, empty when idle
    pub transferred_text: String,

    /// Last speed text, empty when idle
    pub speed_text: String,

    /// Last failure message, empty on success
    pub error: String,

    /// Peers currently downloading (send only)
    pub active_peers: HashMap<String, PeerProgress>,

    /// Reserved batch suffix, if any
    pub staging_suffix: Option<String>,

    /// TRUE while a transfer process is attached
    pub has_process: bool,

    /// When the session was created
    pub created_at: DateTime<Utc>,
}
