//! # Peer-to-peer transfer session manager
//!
//! Drives an external peer-to-peer transfer binary (`sendme` by default) to
//! share local files and fetch remote ones, and tracks many such transfers
//! at once.
//!
//! The binary offers no structured interface: it is started per session, its
//! terminal output is captured (from pipes or a tailed log file) and parsed
//! line by line for the connection ticket, progress, speed and peers.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kodegen_p2p_transfer::{SendOptions, TransferManager, TransferOptions};
//! use std::path::PathBuf;
//!
//! # async fn example() -> kodegen_p2p_transfer::Result<()> {
//! let manager = TransferManager::in_memory(TransferOptions::default())?;
//!
//! let id = manager
//!     .start_send(
//!         vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")],
//!         SendOptions::default(),
//!     )
//!     .await?;
//!
//! let snapshot = manager.get(&id)?;
//! println!("{} is {}", snapshot.id, snapshot.state);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Features
//!
//! ### 1. Staging
//!
//! Multi-file sends are compressed into a single archive, or hard-linked into
//! a batch folder when archiving is disabled. Originals are never modified.
//!
//! ### 2. Admission
//!
//! At most [`TransferOptions::max_concurrent`] sessions run at once; the rest
//! wait in a FIFO queue.
//!
//! ### 3. Progress
//!
//! [`progress::parse_line`] extracts tickets and progress from raw output.
//! Sessions expose the result through [`SessionSnapshot`].
//!
//! ### 4. Persistence
//!
//! Session lists are written to a [`SessionStore`] after every change and
//! can be resumed with [`TransferManager::restore`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod manager;
pub mod persistence;
pub mod progress;
pub mod staging;
pub mod transport;
pub mod types;

// Re-export commonly used types for external API
pub use error::{Result, TransferError};
pub use manager::{RestoreReport, TransferManager};
pub use persistence::{JsonSessionStore, MemorySessionStore, PersistedSession, SessionStore};
pub use progress::{ProgressEvent, parse_line};
pub use transport::{LaunchMode, LaunchRequest, SubprocessLauncher, TransferCommand};

// Re-export type submodules for flat public API
pub use types::identifiers::{SessionId, Ticket};
pub use types::options::{TerminalWrapper, TransferOptions, TransferOptionsBuilder};
pub use types::session::{
    Direction, PayloadDescriptor, PeerProgress, SendOptions, SessionSnapshot, SessionState,
};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
