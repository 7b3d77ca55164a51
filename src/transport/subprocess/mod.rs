//! Subprocess transport for the external transfer binary
//!
//! This module starts the binary through a pseudo-terminal wrapper and
//! captures its output either from pipes or by tailing a log file.

mod command;
mod config;
mod lifecycle;
mod reader;
mod transport;

// Re-export public types
pub use command::shell_quote;
pub use transport::SubprocessLauncher;
