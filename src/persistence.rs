//! Session list persistence
//!
//! The manager is the single writer: after every meaningful mutation it
//! hands the complete send and receive lists to a [`SessionStore`]. Stores
//! are only read back by `TransferManager::restore`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TransferError};
use crate::types::identifiers::{SessionId, Ticket};
use crate::types::session::{Direction, SessionState};

/// Fields of a session that survive a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Session id at the time it was saved
    pub id: SessionId,
    /// Send or receive
    pub direction: Direction,
    /// Last known state
    pub state: SessionState,
    /// Ticket, if one was known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Ticket>,
    /// Original send sources
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    /// Archive preference of the original send
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_archive: Option<bool>,
    /// Receive directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Last failure message
    #[serde(default)]
    pub error: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// External store for the session lists
pub trait SessionStore: Send + Sync {
    /// Load persisted send sessions
    ///
    /// # Errors
    /// Returns error if the store exists but cannot be read
    fn load_send_sessions(&self) -> Result<Vec<PersistedSession>>;

    /// Load persisted receive sessions
    ///
    /// # Errors
    /// Returns error if the store exists but cannot be read
    fn load_receive_sessions(&self) -> Result<Vec<PersistedSession>>;

    /// Replace the stored send sessions
    ///
    /// # Errors
    /// Returns error if the list cannot be written
    fn save_send_sessions(&self, sessions: &[PersistedSession]) -> Result<()>;

    /// Replace the stored receive sessions
    ///
    /// # Errors
    /// Returns error if the list cannot be written
    fn save_receive_sessions(&self, sessions: &[PersistedSession]) -> Result<()>;
}

// ============================================================================
// JSON FILE STORE
// ============================================================================

/// Stores each list as a JSON file, replaced atomically on save
#[derive(Debug, Clone)]
pub struct JsonSessionStore {
    dir: PathBuf,
}

impl JsonSessionStore {
    /// Store lists under `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn send_path(&self) -> PathBuf {
        self.dir.join("send_sessions.json")
    }

    fn receive_path(&self) -> PathBuf {
        self.dir.join("receive_sessions.json")
    }

    fn load(path: &Path) -> Result<Vec<PersistedSession>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            TransferError::persistence(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(path: &Path, sessions: &[PersistedSession]) -> Result<()> {
        let content = serde_json::to_vec_pretty(sessions)?;
        atomic_write(path, &content)
    }
}

impl SessionStore for JsonSessionStore {
    fn load_send_sessions(&self) -> Result<Vec<PersistedSession>> {
        Self::load(&self.send_path())
    }

    fn load_receive_sessions(&self) -> Result<Vec<PersistedSession>> {
        Self::load(&self.receive_path())
    }

    fn save_send_sessions(&self, sessions: &[PersistedSession]) -> Result<()> {
        Self::save(&self.send_path(), sessions)
    }

    fn save_receive_sessions(&self, sessions: &[PersistedSession]) -> Result<()> {
        Self::save(&self.receive_path(), sessions)
    }
}

/// Write to a temp file, then rename over the target
fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");

    fs::write(&tmp_path, content).map_err(|e| {
        TransferError::persistence(format!("cannot write {}: {e}", tmp_path.display()))
    })?;

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(TransferError::persistence(format!(
            "cannot replace {}: {e}",
            path.display()
        )));
    }
    Ok(())
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Keeps the lists in memory; for embedding callers that persist elsewhere
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sends: Mutex<Vec<PersistedSession>>,
    receives: Mutex<Vec<PersistedSession>>,
}

impl MemorySessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with lists
    #[must_use]
    pub fn with_sessions(sends: Vec<PersistedSession>, receives: Vec<PersistedSession>) -> Self {
        Self {
            sends: Mutex::new(sends),
            receives: Mutex::new(receives),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load_send_sessions(&self) -> Result<Vec<PersistedSession>> {
        Ok(self.sends.lock().clone())
    }

    fn load_receive_sessions(&self) -> Result<Vec<PersistedSession>> {
        Ok(self.receives.lock().clone())
    }

    fn save_send_sessions(&self, sessions: &[PersistedSession]) -> Result<()> {
        *self.sends.lock() = sessions.to_vec();
        Ok(())
    }

    fn save_receive_sessions(&self, sessions: &[PersistedSession]) -> Result<()> {
        *self.receives.lock() = sessions.to_vec();
        Ok(())
    }
}
