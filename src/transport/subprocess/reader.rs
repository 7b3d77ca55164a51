//! Output reading for subprocess transport: pipes and tailed log files

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::progress::LineSplitter;

use super::super::ProcessOutput;
use super::config::READ_CHUNK_SIZE;

/// Spawn a task forwarding every line of `reader` to `tx`
pub(super) fn spawn_pipe_reader<R>(
    reader: R,
    tx: mpsc::UnboundedSender<ProcessOutput>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = reader;
        let mut splitter = LineSplitter::new();
        let mut buffer = vec![0u8; READ_CHUNK_SIZE];

        loop {
            match reader.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => {
                    for text in splitter.push(&buffer[..n]) {
                        if tx.send(ProcessOutput::Line { text, replay: false }).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    log::debug!("pipe read failed: {e}");
                    break;
                }
            }
        }

        if let Some(text) = splitter.finish() {
            let _ = tx.send(ProcessOutput::Line { text, replay: false });
        }
    })
}

/// Incremental reader over a log file the process appends to
#[derive(Debug)]
pub(super) struct LogTail {
    path: PathBuf,
    read_pos: u64,
    splitter: LineSplitter,
}

impl LogTail {
    pub(super) fn new(path: PathBuf) -> Self {
        Self {
            path,
            read_pos: 0,
            splitter: LineSplitter::new(),
        }
    }

    /// Bytes already turned into complete lines
    fn consumed(&self) -> usize {
        (self.read_pos as usize).saturating_sub(self.splitter.pending_len())
    }

    /// Forward lines appended since the previous poll
    pub(super) async fn poll(&mut self, tx: &mpsc::UnboundedSender<ProcessOutput>) {
        let Ok(mut file) = tokio::fs::File::open(&self.path).await else {
            // not created yet
            return;
        };
        let len = match file.metadata().await {
            Ok(meta) => meta.len(),
            Err(_) => return,
        };
        if len < self.read_pos {
            log::debug!("{} was truncated, restarting tail", self.path.display());
            self.read_pos = 0;
            self.splitter = LineSplitter::new();
        }
        if len == self.read_pos || file.seek(SeekFrom::Start(self.read_pos)).await.is_err() {
            return;
        }

        let mut appended = Vec::with_capacity((len - self.read_pos) as usize);
        if let Err(e) = (&mut file)
            .take(len - self.read_pos)
            .read_to_end(&mut appended)
            .await
        {
            log::debug!("tail read of {} failed: {e}", self.path.display());
            return;
        }
        self.read_pos += appended.len() as u64;

        for text in self.splitter.push(&appended) {
            let _ = tx.send(ProcessOutput::Line { text, replay: false });
        }
    }

    /// One last read of the whole log after the process exited
    ///
    /// Content already forwarded is re-sent flagged as replay; everything
    /// after it, including an unterminated last line, is sent as fresh output.
    pub(super) async fn final_read(self, tx: &mpsc::UnboundedSender<ProcessOutput>) {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                log::debug!("final read of {} failed: {e}", self.path.display());
                return;
            }
        };
        let split = self.consumed().min(content.len());
        let (seen, fresh) = content.split_at(split);

        let mut replay = LineSplitter::new();
        let mut replayed = replay.push(seen);
        replayed.extend(replay.finish());
        for text in replayed {
            let _ = tx.send(ProcessOutput::Line { text, replay: true });
        }

        let mut tail = LineSplitter::new();
        let mut lines = tail.push(fresh);
        lines.extend(tail.finish());
        for text in lines {
            let _ = tx.send(ProcessOutput::Line { text, replay: false });
        }
    }
}

/// Spawn the periodic tail task; it returns its reader state once cancelled
pub(super) fn spawn_log_tail(
    path: PathBuf,
    interval: Duration,
    tx: mpsc::UnboundedSender<ProcessOutput>,
    cancel: CancellationToken,
) -> JoinHandle<LogTail> {
    tokio::spawn(async move {
        let mut tail = LogTail::new(path);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => tail.poll(&tx).await,
            }
        }
        tail
    })
}
