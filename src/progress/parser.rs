//! Line parser for transfer binary output
//!
//! The binary has no structured output, so every recognised fact is
//! pattern-matched out of human-readable text. Unrecognised lines produce no
//! events and are never an error.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

use crate::types::session::Direction;

/// Fixed prefix of tickets printed by the transfer binary
pub const TICKET_PREFIX: &str = "blob";

static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
        .expect("valid ANSI regex")
});

static TICKET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b({TICKET_PREFIX}[a-z0-9]{{32,}})\b")).expect("valid ticket regex")
});

static CONNECTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:connected|connection established)\b").expect("valid connection regex")
});

static SPEED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*((?i:[kmgtp]i?b|b))/s\b").expect("valid speed regex")
});

static PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\d+(?:\.\d+)?)\s*((?i:[kmgtp]i?b|b))\s*/\s*(\d+(?:\.\d+)?)\s*((?i:[kmgtp]i?b|b))\b",
    )
    .expect("valid progress regex")
});

static PEER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([0-9a-f]{6,64}):\s").expect("valid peer regex"));

/// One fact recognised in a line of output
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A ticket-shaped token
    Ticket(String),
    /// The binary reported an established connection
    Connected,
    /// A `<value><unit>/s` rate
    Speed(String),
    /// Aggregate `transferred / total`
    Transfer(TransferAmount),
    /// Per-peer `transferred / total` (send only)
    Peer {
        /// Remote peer identifier
        peer: String,
        /// Amount reported for that peer
        amount: TransferAmount,
    },
}

/// A parsed `transferred / total` pair
#[derive(Debug, Clone, PartialEq)]
pub struct TransferAmount {
    /// Rendered transferred amount, e.g. `12.3 MiB`
    pub transferred: String,
    /// Rendered total, e.g. `45.6 MiB`
    pub total: String,
    /// `transferred / total * 100`, clamped to 100
    pub percent: f64,
}

impl TransferAmount {
    /// `transferred / total` as shown to users
    #[must_use]
    pub fn rendered(&self) -> String {
        format!("{} / {}", self.transferred, self.total)
    }
}

/// Remove ANSI escape sequences
#[must_use]
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    ANSI_RE.replace_all(line, "")
}

/// Convert one raw output line into events, in the order they apply
#[must_use]
pub fn parse_line(raw: &str, direction: Direction) -> Vec<ProgressEvent> {
    let line = strip_ansi(raw);
    let line = line.trim_end();
    let mut events = Vec::new();
    if line.trim().is_empty() {
        return events;
    }

    if direction == Direction::Send
        && let Some(m) = TICKET_RE.captures(line).and_then(|c| c.get(1))
    {
        events.push(ProgressEvent::Ticket(m.as_str().to_string()));
    }

    if CONNECTED_RE.is_match(line) {
        events.push(ProgressEvent::Connected);
    }

    if let Some(c) = SPEED_RE.captures(line) {
        events.push(ProgressEvent::Speed(format!("{} {}/s", &c[1], &c[2])));
    }

    if let Some(amount) = parse_amount(line) {
        if direction == Direction::Send
            && let Some(peer) = PEER_RE.captures(line).and_then(|c| c.get(1))
        {
            events.push(ProgressEvent::Peer {
                peer: peer.as_str().to_string(),
                amount: amount.clone(),
            });
        }
        events.push(ProgressEvent::Transfer(amount));
    }

    events
}

fn parse_amount(line: &str) -> Option<TransferAmount> {
    let c = PAIR_RE.captures(line)?;
    let done = to_bytes(&c[1], &c[2])?;
    let total = to_bytes(&c[3], &c[4])?;
    let percent = if total > 0.0 {
        (done / total * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    Some(TransferAmount {
        transferred: format!("{} {}", &c[1], &c[2]),
        total: format!("{} {}", &c[3], &c[4]),
        percent,
    })
}

fn to_bytes(value: &str, unit: &str) -> Option<f64> {
    let value: f64 = value.parse().ok()?;
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "b" => 1.0,
        "kb" => 1e3,
        "mb" => 1e6,
        "gb" => 1e9,
        "tb" => 1e12,
        "pb" => 1e15,
        "kib" => 1024.0,
        "mib" => 1024.0_f64.powi(2),
        "gib" => 1024.0_f64.powi(3),
        "tib" => 1024.0_f64.powi(4),
        "pib" => 1024.0_f64.powi(5),
        _ => return None,
    };
    Some(value * multiplier)
}
