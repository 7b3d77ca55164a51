//! Command building for the transfer binary

use std::ffi::OsString;
use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{Result, TransferError};
use crate::types::options::TerminalWrapper;

use super::super::{LaunchMode, LaunchRequest, TransferCommand};
use super::config::SCRIPT_BINARY;

/// Command builder for one launch
pub struct CommandBuilder<'a> {
    binary: &'a Path,
    request: &'a LaunchRequest,
    wrapper: TerminalWrapper,
    verbose: bool,
}

impl<'a> CommandBuilder<'a> {
    /// Create a new command builder
    pub fn new(
        binary: &'a Path,
        request: &'a LaunchRequest,
        wrapper: TerminalWrapper,
        verbose: bool,
    ) -> Self {
        Self {
            binary,
            request,
            wrapper,
            verbose,
        }
    }

    /// Arguments passed to the transfer binary itself
    pub fn binary_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = match &self.request.command {
            TransferCommand::Send { payload } => vec!["send".into(), payload.into()],
            TransferCommand::Receive { ticket, .. } => {
                vec!["receive".into(), ticket.as_str().into()]
            }
        };
        if self.verbose {
            args.push("-v".into());
        }
        args
    }

    /// Build the complete command with stdio wired for the launch mode
    ///
    /// # Errors
    /// Returns a spawn error if the tail log cannot be created
    pub fn build(&self) -> Result<Command> {
        let mut cmd = match self.wrapper {
            TerminalWrapper::None => self.direct(),
            TerminalWrapper::Script => self.wrapped(),
        };

        if let TransferCommand::Receive {
            output_dir: Some(dir),
            ..
        } = &self.request.command
        {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null()).kill_on_drop(true);

        match (self.request.mode, self.wrapper) {
            (LaunchMode::Pipe, _) => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            // `script` writes the transcript to the log itself
            (LaunchMode::Tail, TerminalWrapper::Script) => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
            (LaunchMode::Tail, TerminalWrapper::None) => {
                let log = File::create(self.log_path()?).map_err(|e| {
                    TransferError::spawn(format!("cannot create tail log: {e}"))
                })?;
                let log_err = log
                    .try_clone()
                    .map_err(|e| TransferError::spawn(format!("cannot share tail log: {e}")))?;
                cmd.stdout(Stdio::from(log)).stderr(Stdio::from(log_err));
            }
        }

        Ok(cmd)
    }

    fn direct(&self) -> Command {
        let mut cmd = Command::new(self.binary);
        cmd.args(self.binary_args());
        cmd
    }

    #[cfg(target_os = "macos")]
    fn wrapped(&self) -> Command {
        // BSD script: script [-q] [-F] file command ...
        let mut cmd = Command::new(SCRIPT_BINARY);
        cmd.arg("-q")
            .arg("-F")
            .arg(self.transcript_target())
            .arg(self.binary)
            .args(self.binary_args());
        cmd
    }

    #[cfg(not(target_os = "macos"))]
    fn wrapped(&self) -> Command {
        // util-linux script: script -q -f -e -c "<command>" file
        let mut line = shell_quote(&self.binary.to_string_lossy());
        for arg in self.binary_args() {
            line.push(' ');
            line.push_str(&shell_quote(&arg.to_string_lossy()));
        }
        let mut cmd = Command::new(SCRIPT_BINARY);
        cmd.args(["-q", "-f", "-e", "-c"])
            .arg(line)
            .arg(self.transcript_target());
        cmd
    }

    fn transcript_target(&self) -> OsString {
        match (self.request.mode, &self.request.log_path) {
            (LaunchMode::Tail, Some(path)) => path.into(),
            _ => "/dev/null".into(),
        }
    }

    fn log_path(&self) -> Result<&Path> {
        self.request
            .log_path
            .as_deref()
            .ok_or_else(|| TransferError::spawn("tail mode requires a log path"))
    }
}

/// Quote a word for `sh -c`
pub fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+".contains(c))
    {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}
