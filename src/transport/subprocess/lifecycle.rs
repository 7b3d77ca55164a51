//! Lifecycle management for subprocess transport (spawn, supervise, kill)

use std::path::Path;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransferError};

use super::super::{
    ExitOutcome, LaunchMode, LaunchRequest, LaunchedProcess, ProcessCommand, ProcessHandle,
    ProcessOutput,
};
use super::command::CommandBuilder;
use super::config::READER_DRAIN_TIMEOUT;
use super::reader::{spawn_log_tail, spawn_pipe_reader};
use super::transport::SubprocessLauncher;

impl SubprocessLauncher {
    /// Spawn the process and its supervisor
    ///
    /// The supervisor owns the child. It forwards output, honours kill
    /// commands, and after exit drains remaining output before sending the
    /// final `Exited`.
    pub(super) fn spawn_impl(&self, binary: &Path, request: LaunchRequest) -> Result<LaunchedProcess> {
        let builder = CommandBuilder::new(
            binary,
            &request,
            self.options.terminal_wrapper,
            self.options.verbose,
        );
        let mut cmd = builder.build()?;

        let mut child = cmd.spawn().map_err(|e| {
            TransferError::spawn(format!("{}: {e}", binary.display()))
        })?;
        let pid = child.id();
        log::info!(
            "[{}] started {} (pid {:?}, {:?} mode)",
            request.session_id,
            binary.display(),
            pid,
            request.mode
        );

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let capture = match request.mode {
            LaunchMode::Pipe => {
                let mut readers = Vec::with_capacity(2);
                if let Some(stdout) = child.stdout.take() {
                    readers.push(spawn_pipe_reader(stdout, output_tx.clone()));
                }
                if let Some(stderr) = child.stderr.take() {
                    readers.push(spawn_pipe_reader(stderr, output_tx.clone()));
                }
                Capture::Pipes(readers)
            }
            LaunchMode::Tail => {
                let path = request
                    .log_path
                    .clone()
                    .ok_or_else(|| TransferError::spawn("tail mode requires a log path"))?;
                let cancel = CancellationToken::new();
                let task = spawn_log_tail(
                    path,
                    self.options.tail_poll_interval,
                    output_tx.clone(),
                    cancel.clone(),
                );
                Capture::Tail { task, cancel }
            }
        };

        let session_id = request.session_id.clone();
        tokio::spawn(async move {
            let outcome = supervise(&mut child, command_rx).await;
            log::debug!("[{session_id}] process exited: {outcome:?}");
            capture.drain(&output_tx).await;
            let _ = output_tx.send(ProcessOutput::Exited(outcome));
        });

        Ok(LaunchedProcess {
            handle: ProcessHandle::new(pid, command_tx),
            output: output_rx,
        })
    }
}

/// Wait for exit, killing on request
async fn supervise(
    child: &mut Child,
    mut command_rx: mpsc::UnboundedReceiver<ProcessCommand>,
) -> ExitOutcome {
    let status = tokio::select! {
        status = child.wait() => status,
        Some(ProcessCommand::Kill { response_tx }) = command_rx.recv() => {
            if let Err(e) = child.start_kill() {
                log::debug!("kill failed (process already gone?): {e}");
            }
            let _ = response_tx.send(());
            child.wait().await
        }
    };

    // Later kill requests find the process gone
    command_rx.close();
    while let Ok(ProcessCommand::Kill { response_tx }) = command_rx.try_recv() {
        let _ = response_tx.send(());
    }

    match status {
        Ok(status) => ExitOutcome {
            code: status.code(),
            success: status.success(),
            error: None,
        },
        Err(e) => ExitOutcome {
            code: None,
            success: false,
            error: Some(format!("failed to wait for process: {e}")),
        },
    }
}

/// How output is being captured for one process
enum Capture {
    Pipes(Vec<tokio::task::JoinHandle<()>>),
    Tail {
        task: tokio::task::JoinHandle<super::reader::LogTail>,
        cancel: CancellationToken,
    },
}

impl Capture {
    /// Collect the last output after exit
    async fn drain(self, output_tx: &mpsc::UnboundedSender<ProcessOutput>) {
        match self {
            Self::Pipes(readers) => {
                for mut reader in readers {
                    if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut reader)
                        .await
                        .is_err()
                    {
                        log::debug!("pipe still open after exit, abandoning reader");
                        reader.abort();
                    }
                }
            }
            Self::Tail { task, cancel } => {
                cancel.cancel();
                match task.await {
                    Ok(tail) => tail.final_read(output_tx).await,
                    Err(e) => log::warn!("log tail task failed: {e}"),
                }
            }
        }
    }
}
