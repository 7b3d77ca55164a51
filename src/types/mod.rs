//! Type definitions for the transfer session manager
//!
//! - [`identifiers`] - Type-safe ID wrappers (`SessionId`, `Ticket`)
//! - [`session`] - Session state, payloads, progress and snapshots
//! - [`options`] - Manager configuration

pub mod identifiers;
pub mod options;
pub mod session;

pub use identifiers::{SessionId, Ticket};
pub use options::{TerminalWrapper, TransferOptions, TransferOptionsBuilder};
pub use session::{
    Direction, PayloadDescriptor, PeerProgress, SendOptions, SessionSnapshot, SessionState,
};
