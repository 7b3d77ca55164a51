//! Transfer session manager implementation
//!
//! This module is organized into logical submodules:
//! - `core`: Core struct, constructors, and shutdown
//! - `spawn`: Send/receive creation and staging hand-off
//! - `list`: Status snapshots
//! - `interaction`: Cancel, remove and re-share
//! - `restore`: Resuming persisted sessions

mod core;
mod interaction;
mod list;
mod restore;
mod spawn;

pub use core::TransferManager;
pub use restore::RestoreReport;
