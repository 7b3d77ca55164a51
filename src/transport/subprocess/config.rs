//! Configuration constants for subprocess transport

use std::time::Duration;

/// Read buffer size for pipes and log chunks
pub const READ_CHUNK_SIZE: usize = 4096;

/// How long pipe readers may keep draining after the process exited
///
/// A grandchild of the terminal wrapper can hold the pipe open past exit.
pub const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Pseudo-terminal helper
pub const SCRIPT_BINARY: &str = "script";

/// Install locations probed when the binary is not in PATH, relative to HOME
pub const HOME_INSTALL_DIRS: &[&str] = &[".cargo/bin", ".local/bin", "bin"];

/// System install locations probed when the binary is not in PATH
pub const SYSTEM_INSTALL_DIRS: &[&str] = &["/usr/local/bin", "/opt/homebrew/bin", "/usr/bin"];
