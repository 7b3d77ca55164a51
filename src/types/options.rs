//! Transfer manager options and configuration
//!
//! This module contains the configuration for the transfer session manager,
//! including a builder pattern for easy configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, TransferError};

/// Default transfer binary name searched in PATH
pub const DEFAULT_BINARY_NAME: &str = "sendme";

/// Default number of concurrently active sessions
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Number of distinct 3-digit batch suffixes
pub const DEFAULT_SUFFIX_POOL_SIZE: u16 = 1000;

// ============================================================================
// Terminal Wrapper
// ============================================================================

/// How the transfer binary is given a terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalWrapper {
    /// Run through `script(1)`, which allocates a pseudo-terminal
    #[default]
    Script,
    /// Spawn the binary directly
    None,
}

// ============================================================================
// Transfer Options
// ============================================================================

/// Main options for the transfer session manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptions {
    /// Explicit path to the transfer binary
    pub binary_path: Option<PathBuf>,
    /// Binary name searched for when `binary_path` is unset
    pub binary_name: String,
    /// Maximum number of concurrently active sessions
    pub max_concurrent: usize,
    /// Root for archives, batch folders and tail logs
    pub staging_dir: PathBuf,
    /// Pseudo-terminal strategy
    pub terminal_wrapper: TerminalWrapper,
    /// Pass `-v` to the binary
    pub verbose: bool,
    /// Quiet period after which a session stops counting as transferring
    #[serde(with = "duration_ms")]
    pub transfer_idle: Duration,
    /// Quiet period after which a downloading peer is forgotten
    #[serde(with = "duration_ms")]
    pub peer_idle: Duration,
    /// Log-tailing poll interval
    #[serde(with = "duration_ms")]
    pub tail_poll_interval: Duration,
    /// Candidate archive names probed before falling back to a timestamp
    pub archive_name_attempts: u32,
    /// Number of batch suffixes available before the timestamp fallback
    pub suffix_pool_size: u16,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            binary_path: None,
            binary_name: DEFAULT_BINARY_NAME.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            staging_dir: std::env::temp_dir().join("kodegen-p2p-transfer"),
            terminal_wrapper: TerminalWrapper::default(),
            verbose: true,
            transfer_idle: Duration::from_secs(2),
            peer_idle: Duration::from_secs(3),
            tail_poll_interval: Duration::from_millis(250),
            archive_name_attempts: 16,
            suffix_pool_size: DEFAULT_SUFFIX_POOL_SIZE,
        }
    }
}

impl TransferOptions {
    /// Create a new builder for `TransferOptions`
    #[must_use]
    pub fn builder() -> TransferOptionsBuilder {
        TransferOptionsBuilder::default()
    }

    /// Reject configurations the manager cannot run with
    ///
    /// # Errors
    /// Returns `InvalidConfig` for a zero concurrency limit, zero timers,
    /// or an empty suffix pool
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(TransferError::invalid_config("max_concurrent must be at least 1"));
        }
        if self.transfer_idle.is_zero() || self.peer_idle.is_zero() {
            return Err(TransferError::invalid_config("idle timers must be non-zero"));
        }
        if self.tail_poll_interval.is_zero() {
            return Err(TransferError::invalid_config(
                "tail_poll_interval must be non-zero",
            ));
        }
        if self.suffix_pool_size == 0 || self.suffix_pool_size > DEFAULT_SUFFIX_POOL_SIZE {
            return Err(TransferError::invalid_config(format!(
                "suffix_pool_size must be within 1..={DEFAULT_SUFFIX_POOL_SIZE}"
            )));
        }
        Ok(())
    }

    /// Folder holding staged archives
    #[must_use]
    pub fn archive_dir(&self) -> PathBuf {
        self.staging_dir.join("archives")
    }

    /// Folder holding batch folders
    #[must_use]
    pub fn batch_dir(&self) -> PathBuf {
        self.staging_dir.join("batches")
    }

    /// Folder holding tail logs
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.staging_dir.join("logs")
    }
}

// ============================================================================
// Builder for TransferOptions
// ============================================================================

/// Builder for `TransferOptions`
#[derive(Debug, Default)]
pub struct TransferOptionsBuilder {
    options: TransferOptions,
}

impl TransferOptionsBuilder {
    /// Set the transfer binary path
    #[must_use]
    pub fn binary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.binary_path = Some(path.into());
        self
    }

    /// Set the binary name searched in PATH
    #[must_use]
    pub fn binary_name(mut self, name: impl Into<String>) -> Self {
        self.options.binary_name = name.into();
        self
    }

    /// Set the concurrency limit
    #[must_use]
    pub const fn max_concurrent(mut self, limit: usize) -> Self {
        self.options.max_concurrent = limit;
        self
    }

    /// Set the staging root
    #[must_use]
    pub fn staging_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.staging_dir = path.into();
        self
    }

    /// Set the pseudo-terminal strategy
    #[must_use]
    pub const fn terminal_wrapper(mut self, wrapper: TerminalWrapper) -> Self {
        self.options.terminal_wrapper = wrapper;
        self
    }

    /// Toggle `-v`
    #[must_use]
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.options.verbose = verbose;
        self
    }

    /// Set the transfer debounce window
    #[must_use]
    pub const fn transfer_idle(mut self, idle: Duration) -> Self {
        self.options.transfer_idle = idle;
        self
    }

    /// Set the per-peer idle window
    #[must_use]
    pub const fn peer_idle(mut self, idle: Duration) -> Self {
        self.options.peer_idle = idle;
        self
    }

    /// Set the log-tailing poll interval
    #[must_use]
    pub const fn tail_poll_interval(mut self, interval: Duration) -> Self {
        self.options.tail_poll_interval = interval;
        self
    }

    /// Set the number of archive name probes
    #[must_use]
    pub const fn archive_name_attempts(mut self, attempts: u32) -> Self {
        self.options.archive_name_attempts = attempts;
        self
    }

    /// Set the batch suffix pool size
    #[must_use]
    pub const fn suffix_pool_size(mut self, size: u16) -> Self {
        self.options.suffix_pool_size = size;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> TransferOptions {
        self.options
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
