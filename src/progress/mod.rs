//! Progress parsing for transfer binary output
//!
//! [`parse_line`] turns one line of raw or tailed text into structured
//! [`ProgressEvent`]s independent of process plumbing; [`LineSplitter`]
//! cuts byte chunks into lines.

mod lines;
mod parser;

pub use lines::LineSplitter;
pub use parser::{ProgressEvent, TICKET_PREFIX, TransferAmount, parse_line, strip_ansi};
