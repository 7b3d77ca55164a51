//! Transfer session management
//!
//! Provides `TransferManager` for staging, admitting, launching, monitoring
//! and cleaning up concurrent send and receive sessions.
//!
//! # Module Structure
//!
//! - `transfer_manager` - Core `TransferManager` with public API
//! - `coordinator` - Shared state behind the single coordinator lock
//! - `session` - Per-session record and snapshot conversion
//! - `scheduler` - FIFO admission queue
//! - `background` - Output collection and event application
//! - `timers` - Transfer debounce and peer idle timers

mod background;
mod coordinator;
mod scheduler;
mod session;
mod timers;
mod transfer_manager;

pub use transfer_manager::{RestoreReport, TransferManager};
