//! Subprocess launcher for the transfer binary

use std::env;
use std::path::PathBuf;

use crate::error::{Result, TransferError};
use crate::types::options::TransferOptions;

use super::super::{LaunchRequest, LaunchedProcess};
use super::config::{HOME_INSTALL_DIRS, SYSTEM_INSTALL_DIRS};

/// Starts transfer processes, one per session
#[derive(Debug, Clone)]
pub struct SubprocessLauncher {
    pub(super) options: TransferOptions,
}

impl SubprocessLauncher {
    /// Create a launcher for the given options
    #[must_use]
    pub fn new(options: TransferOptions) -> Self {
        Self { options }
    }

    /// Start the binary for one session
    ///
    /// # Errors
    /// Returns a spawn error if the binary cannot be found or started
    pub fn launch(&self, request: LaunchRequest) -> Result<LaunchedProcess> {
        let binary = self.resolve_binary()?;
        self.spawn_impl(&binary, request)
    }

    /// Explicit `binary_path`, else a PATH / install-dir search
    ///
    /// # Errors
    /// Returns `BinaryNotFound` when no candidate exists
    pub fn resolve_binary(&self) -> Result<PathBuf> {
        match &self.options.binary_path {
            Some(path) => Ok(path.clone()),
            None => Self::find_binary(&self.options.binary_name),
        }
    }

    /// Find the transfer binary by name
    ///
    /// # Errors
    /// Returns error if the binary cannot be found in PATH or common locations
    pub fn find_binary(name: &str) -> Result<PathBuf> {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }

        let mut locations: Vec<PathBuf> = Vec::new();
        if let Ok(home) = env::var("HOME") {
            let home = PathBuf::from(home);
            locations.extend(HOME_INSTALL_DIRS.iter().map(|dir| home.join(dir).join(name)));
        }
        locations.extend(
            SYSTEM_INSTALL_DIRS
                .iter()
                .map(|dir| PathBuf::from(dir).join(name)),
        );

        locations
            .into_iter()
            .find(|path| path.is_file())
            .ok_or_else(|| TransferError::binary_not_found(name))
    }
}
