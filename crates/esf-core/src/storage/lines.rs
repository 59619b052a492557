//! Splitting object content into lines with resumable offsets.

use bytes::{Bytes, BytesMut};

/// A single line of an object, without its newline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub data: Bytes,
    /// Offset just past the line's newline, in the decompressed content
    pub ending_offset: u64,
    /// 0 for a final unterminated line, 1 for `\n`, 2 for `\r\n`
    pub newline_length: usize,
}

impl LogLine {
    /// Offset of the first byte of the line
    pub fn starting_offset(&self) -> u64 {
        self.ending_offset - (self.data.len() + self.newline_length) as u64
    }

    pub fn is_blank(&self) -> bool {
        self.data.iter().all(u8::is_ascii_whitespace)
    }
}

/// Incremental line splitter over content that arrives in chunks.
///
/// Offsets count from the start of the content, whatever the chunking.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: BytesMut,
    /// Offset of the first buffered byte
    offset: u64,
    /// Leading buffered bytes known to hold no newline
    scanned: usize,
}

impl LineSplitter {
    /// Splitter for content whose first pushed byte is at `offset`
    pub fn new(offset: u64) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Offset just past everything pushed so far
    pub fn end_offset(&self) -> u64 {
        self.offset + self.buffer.len() as u64
    }

    /// Next complete line. Once the content is exhausted (`eof`) a final
    /// line without newline is returned as well.
    pub fn next_line(&mut self, eof: bool) -> Option<LogLine> {
        let newline_at = self.buffer[self.scanned..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|pos| self.scanned + pos);

        let (mut data, newline_length) = match newline_at {
            Some(newline_at) => {
                let data = self.buffer.split_to(newline_at + 1);
                let newline_length = if data.ends_with(b"\r\n") { 2 } else { 1 };
                (data, newline_length)
            }
            None if eof && !self.buffer.is_empty() => (self.buffer.split(), 0),
            None => {
                self.scanned = self.buffer.len();
                return None;
            }
        };

        self.scanned = 0;
        self.offset += data.len() as u64;
        data.truncate(data.len() - newline_length);
        Some(LogLine {
            data: data.freeze(),
            ending_offset: self.offset,
            newline_length,
        })
    }
}

/// Split `content` into lines, keeping only those starting at or after
/// `range_start`.
pub fn split_lines(content: &Bytes, range_start: u64) -> Vec<LogLine> {
    let mut splitter = LineSplitter::new(0);
    splitter.push(content);

    let mut lines = Vec::new();
    while let Some(line) = splitter.next_line(true) {
        if line.starting_offset() >= range_start {
            lines.push(line);
        }
    }
    lines
}
