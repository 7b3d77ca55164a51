//! Coordinator state shared by the manager and its background tasks
//!
//! All cross-session state (the session set, the admission queue and the
//! suffix pool) lives behind one lock. The lock is never held across an
//! await; every mutation completes before control is yielded.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

use crate::persistence::{PersistedSession, SessionStore};
use crate::staging::SuffixPool;
use crate::transport::{LaunchRequest, SubprocessLauncher};
use crate::types::identifiers::SessionId;
use crate::types::options::TransferOptions;
use crate::types::session::{Direction, SessionState};

use super::background::spawn_output_collector;
use super::scheduler::AdmissionQueue;
use super::session::SessionEntry;

/// Mutable state guarded by the coordinator lock
pub(crate) struct Coordinator {
    pub sessions: HashMap<SessionId, SessionEntry>,
    pub queue: AdmissionQueue,
    pub suffixes: SuffixPool,
    /// Sessions removed while staging, with the suffix their staging still writes under
    pub staging_orphans: HashMap<SessionId, Option<String>>,
    /// Bumped for every snapshot handed to the store
    persist_version: u64,
    next_seq: u64,
}

impl Coordinator {
    pub fn new(suffix_pool_size: u16) -> Self {
        Self {
            sessions: HashMap::new(),
            queue: AdmissionQueue::default(),
            suffixes: SuffixPool::new(suffix_pool_size),
            staging_orphans: HashMap::new(),
            persist_version: 0,
            next_seq: 0,
        }
    }

    /// Next creation sequence number
    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.state == SessionState::Active)
            .count()
    }

    /// Sessions in creation order
    pub fn ordered(&self) -> Vec<&SessionEntry> {
        let mut entries: Vec<&SessionEntry> = self.sessions.values().collect();
        entries.sort_by_key(|s| s.seq);
        entries
    }
}

/// Everything the manager and its tasks share
pub(crate) struct Shared {
    pub options: TransferOptions,
    pub launcher: SubprocessLauncher,
    pub store: Arc<dyn SessionStore>,
    pub state: Mutex<Coordinator>,
    /// Serializes store writes; holds the last written snapshot version
    persist_lock: Mutex<u64>,
    /// Publishes the last written snapshot version to `flush`
    written: watch::Sender<u64>,
    /// Set by shutdown; stops admission and persistence
    closed: AtomicBool,
}

impl Shared {
    pub fn new(options: TransferOptions, store: Arc<dyn SessionStore>) -> Self {
        Self {
            launcher: SubprocessLauncher::new(options.clone()),
            state: Mutex::new(Coordinator::new(options.suffix_pool_size)),
            persist_lock: Mutex::new(0),
            written: watch::channel(0).0,
            closed: AtomicBool::new(false),
            options,
            store,
        }
    }

    /// Stop admitting and persisting; returns FALSE if already closed
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ========================================================================
    // ADMISSION
    // ========================================================================

    /// Promote pending sessions while slots are free, then launch them
    ///
    /// Safe to call at any time; with nothing pending or no free slot it
    /// changes nothing. Sessions that fail to launch free their slot and
    /// admission runs again. Returns the number of sessions promoted.
    pub fn pump(self: &Arc<Self>) -> usize {
        let mut promoted = 0;
        loop {
            if self.is_closed() {
                break;
            }
            let (launches, mut failed) = self.admit();
            if launches.is_empty() && failed == 0 {
                break;
            }
            promoted += launches.len();
            for request in launches {
                if !self.launch(request) {
                    failed += 1;
                }
            }
            self.persist();
            if failed == 0 {
                break;
            }
        }
        promoted
    }

    /// Move admitted sessions to active under the lock
    ///
    /// Returns the launch requests and how many admitted sessions failed
    /// without one.
    fn admit(&self) -> (Vec<LaunchRequest>, usize) {
        let mut state = self.state.lock();
        let active = state.active_count();
        let Coordinator {
            sessions, queue, ..
        } = &mut *state;

        let admitted = queue.admit(active, self.options.max_concurrent, |id| {
            sessions
                .get(id)
                .is_some_and(|s| s.state == SessionState::Pending)
        });

        let mut launches = Vec::with_capacity(admitted.len());
        let mut failed = 0;
        for id in admitted {
            let Some(entry) = sessions.get_mut(&id) else {
                continue;
            };
            match entry.launch_request(&self.options) {
                Some(request) => {
                    entry.transition(SessionState::Active);
                    launches.push(request);
                }
                None => {
                    entry.error = "nothing to launch".to_string();
                    entry.transition(SessionState::Failed);
                    failed += 1;
                }
            }
        }
        (launches, failed)
    }

    /// Start the process for a freshly promoted session
    ///
    /// Returns FALSE if the process could not be spawned; the session is
    /// failed and its slot is free again.
    fn launch(self: &Arc<Self>, request: LaunchRequest) -> bool {
        let id = request.session_id.clone();
        match self.launcher.launch(request) {
            Ok(launched) => {
                let mut state = self.state.lock();
                match state.sessions.get_mut(&id) {
                    Some(entry) if entry.state == SessionState::Active => {
                        entry.process = Some(launched.handle);
                        drop(state);
                        spawn_output_collector(Arc::clone(self), id, launched.output);
                    }
                    _ => {
                        // Cancelled or removed while spawning
                        drop(state);
                        log::debug!("[{id}] session ended during spawn, killing process");
                        tokio::spawn(launched.handle.kill());
                    }
                }
                true
            }
            Err(e) => {
                log::error!("[{id}] failed to launch: {e}");
                let mut state = self.state.lock();
                if let Some(entry) = state.sessions.get_mut(&id) {
                    entry.error = e.to_string();
                    entry.transition(SessionState::Failed);
                }
                false
            }
        }
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Hand the full session lists to the store
    ///
    /// The lists are captured now and written on the blocking pool; a write
    /// that lands after a newer one is dropped. Failures are logged; a broken
    /// store never fails a session.
    pub fn persist(self: &Arc<Self>) {
        if self.is_closed() {
            return;
        }
        let (version, sends, receives) = {
            let mut state = self.state.lock();
            state.persist_version += 1;
            let (sends, receives): (Vec<_>, Vec<_>) = state
                .ordered()
                .into_iter()
                .map(SessionEntry::to_persisted)
                .partition(|s| s.direction == Direction::Send);
            (state.persist_version, sends, receives)
        };

        let shared = Arc::clone(self);
        let write = move || shared.write_snapshot(version, &sends, &receives);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }

    fn write_snapshot(
        &self,
        version: u64,
        sends: &[PersistedSession],
        receives: &[PersistedSession],
    ) {
        let mut written = self.persist_lock.lock();
        if *written >= version {
            return;
        }
        if let Err(e) = self.store.save_send_sessions(sends) {
            log::warn!("Failed to save send sessions: {e}");
        }
        if let Err(e) = self.store.save_receive_sessions(receives) {
            log::warn!("Failed to save receive sessions: {e}");
        }
        *written = version;
        self.written.send_replace(version);
    }

    /// Wait until every snapshot taken so far has reached the store
    pub async fn flush(&self) {
        let target = self.state.lock().persist_version;
        let mut written = self.written.subscribe();
        if written.wait_for(|v| *v >= target).await.is_err() {
            log::warn!("Persistence writer gone before flush completed");
        }
    }
}
