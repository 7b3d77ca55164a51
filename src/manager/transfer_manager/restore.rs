//! Restoring sessions from the store after a restart

use std::sync::Arc;

use crate::error::{Result, TransferError};
use crate::persistence::PersistedSession;
use crate::types::identifiers::SessionId;
use crate::types::session::{SendOptions, SessionState};

use super::super::session::SessionEntry;
use super::core::TransferManager;

/// Outcome of [`TransferManager::restore`]
#[derive(Debug, Default, Clone)]
pub struct RestoreReport {
    /// `(old id, new id)` for every send shared again; old tickets are invalid
    pub reshared: Vec<(SessionId, SessionId)>,
    /// `(old id, new id)` for every receive queued again
    pub requeued: Vec<(SessionId, SessionId)>,
    /// Terminal sessions kept as read-only records
    pub records: Vec<SessionId>,
}

impl TransferManager {
    /// Load the persisted lists and resume what was running
    ///
    /// - sends that were not cancelled are staged again under a new id and
    ///   will mint a new ticket
    /// - pending or active receives are queued again under a new id
    /// - everything else is kept as a terminal record
    ///
    /// # Errors
    /// Returns a persistence error if the store cannot be read
    pub async fn restore(&self) -> Result<RestoreReport> {
        let store = Arc::clone(&self.shared.store);
        let (sends, receives) = tokio::task::spawn_blocking(move || {
            Ok::<_, TransferError>((store.load_send_sessions()?, store.load_receive_sessions()?))
        })
        .await
        .map_err(|e| TransferError::persistence(format!("restore task failed: {e}")))??;
        log::info!(
            "Restoring {} send and {} receive sessions",
            sends.len(),
            receives.len()
        );

        let mut report = RestoreReport::default();

        for record in sends {
            if record.state == SessionState::Cancelled || record.sources.is_empty() {
                report.records.push(self.keep_record(record));
                continue;
            }
            let options = SendOptions {
                force_archive: record.force_archive,
            };
            match self.start_send(record.sources.clone(), options).await {
                Ok(new_id) => {
                    log::info!("[{}] restored as {new_id}; previous ticket is invalid", record.id);
                    report.reshared.push((record.id, new_id));
                }
                Err(e) => report.records.push(self.keep_failed(record, &e)),
            }
        }

        for record in receives {
            let Some(ticket) = record.ticket.clone().filter(|_| !record.state.is_terminal()) else {
                report.records.push(self.keep_record(record));
                continue;
            };
            match self
                .start_receive(ticket.as_str(), record.output_dir.clone())
                .await
            {
                Ok(new_id) => {
                    log::info!("[{}] restored as {new_id}", record.id);
                    report.requeued.push((record.id, new_id));
                }
                Err(e) => report.records.push(self.keep_failed(record, &e)),
            }
        }

        self.shared.persist();
        self.shared.flush().await;
        Ok(report)
    }

    fn keep_failed(&self, mut record: PersistedSession, error: &TransferError) -> SessionId {
        log::warn!("[{}] cannot restore: {error}", record.id);
        record.state = SessionState::Failed;
        record.error = error.to_string();
        self.keep_record(record)
    }

    fn keep_record(&self, mut record: PersistedSession) -> SessionId {
        if !record.state.is_terminal() {
            record.state = SessionState::Failed;
            if record.error.is_empty() {
                record.error = "interrupted by restart".to_string();
            }
        }
        let id = record.id.clone();
        let mut state = self.shared.state.lock();
        let seq = state.next_seq();
        state
            .sessions
            .insert(id.clone(), SessionEntry::from_persisted(record, seq));
        id
    }
}
