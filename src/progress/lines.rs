//! Splits raw output chunks into lines
//!
//! Progress bars redraw with `\r`, so both `\r` and `\n` end a line. Bytes
//! after the last terminator are carried over to the next chunk.

/// Incremental line splitter over byte chunks
#[derive(Debug, Default)]
pub struct LineSplitter {
    carry: Vec<u8>,
}

impl LineSplitter {
    /// Create an empty splitter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every completed, non-empty line
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                self.flush_into(&mut lines);
            } else {
                self.carry.push(byte);
            }
        }
        lines
    }

    /// Return the unterminated tail, if any
    pub fn finish(&mut self) -> Option<String> {
        let mut lines = Vec::new();
        self.flush_into(&mut lines);
        lines.pop()
    }

    /// Bytes held back waiting for a terminator
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.carry.len()
    }

    fn flush_into(&mut self, lines: &mut Vec<String>) {
        if !self.carry.is_empty() {
            lines.push(String::from_utf8_lossy(&self.carry).into_owned());
            self.carry.clear();
        }
    }
}
