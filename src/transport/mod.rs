//! Transport layer for driving the external transfer binary
//!
//! This module starts the binary behind a pseudo-terminal wrapper and turns
//! its output into an ordered stream of lines followed by one exit outcome.

pub mod subprocess;

use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

use crate::types::identifiers::{SessionId, Ticket};

/// How process output is captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Read stdout/stderr pipes directly (archives, receives)
    Pipe,
    /// Redirect output to a log file and poll it (folders, raw files)
    Tail,
}

/// Transfer binary subcommand
#[derive(Debug, Clone)]
pub enum TransferCommand {
    /// `<binary> send <payload> -v`
    Send {
        /// Staged or raw payload path
        payload: PathBuf,
    },
    /// `<binary> receive <ticket> -v`
    Receive {
        /// Ticket to fetch
        ticket: Ticket,
        /// Working directory the payload is written into
        output_dir: Option<PathBuf>,
    },
}

/// Everything needed to start one session's process
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Owning session
    pub session_id: SessionId,
    /// Subcommand and argument
    pub command: TransferCommand,
    /// Output capture strategy
    pub mode: LaunchMode,
    /// Log file used in tail mode
    pub log_path: Option<PathBuf>,
}

/// Output observed from a running process, in order
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutput {
    /// One line of output
    Line {
        /// Raw line text, ANSI sequences included
        text: String,
        /// TRUE for lines re-read by the final full log read
        replay: bool,
    },
    /// The process exited; always the last item
    Exited(ExitOutcome),
}

/// How a process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Whether the exit status reported success
    pub success: bool,
    /// Error while waiting on the process
    pub error: Option<String>,
}

impl ExitOutcome {
    /// Human-readable failure description
    #[must_use]
    pub fn describe(&self) -> String {
        match (&self.error, self.code) {
            (Some(err), _) => err.clone(),
            (None, Some(code)) => format!("process exited with code {code}"),
            (None, None) => "process terminated by signal".to_string(),
        }
    }
}

/// Control messages for a process supervisor
#[derive(Debug)]
pub(crate) enum ProcessCommand {
    /// Kill the process; acknowledged once the signal is dispatched
    Kill {
        /// Acknowledgement channel
        response_tx: oneshot::Sender<()>,
    },
}

/// Owned handle to one running transfer process
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    command_tx: mpsc::UnboundedSender<ProcessCommand>,
}

impl ProcessHandle {
    pub(crate) fn new(pid: Option<u32>, command_tx: mpsc::UnboundedSender<ProcessCommand>) -> Self {
        Self { pid, command_tx }
    }

    /// OS process id of the spawned (wrapper) process
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the supervisor is still running
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.command_tx.is_closed()
    }

    /// Kill the process and wait until the signal has been dispatched
    ///
    /// Killing a process that already exited is a no-op.
    pub async fn kill(self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .command_tx
            .send(ProcessCommand::Kill { response_tx })
            .is_ok()
        {
            let _ = response_rx.await;
        }
    }
}

/// A started process: its handle plus its output stream
#[derive(Debug)]
pub struct LaunchedProcess {
    /// Kill handle, owned by the session
    pub handle: ProcessHandle,
    /// Lines, then exactly one `Exited`
    pub output: mpsc::UnboundedReceiver<ProcessOutput>,
}

pub use subprocess::SubprocessLauncher;
