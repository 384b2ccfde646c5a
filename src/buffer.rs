//! The receive buffer: append-only bytes with an advancing read cursor.
//!
//! The tokenizers pull from this one struct. Line searches remember how far
//! they already looked, so feeding a header block one byte at a time stays
//! linear instead of quadratic.

use bytes::{Bytes, BytesMut};
use lazy_static::lazy_static;
use regex::bytes::Regex;

lazy_static! {
    // A header block ends at the first blank line. The leading \n belongs
    // to the previous line, which is how a bare-LF block still terminates.
    static ref BLANK_LINE_RE: Regex = Regex::new(r"(?-u)\n\r?\n").unwrap();
}

pub(crate) struct ReceiveBuffer {
    data: BytesMut,
    // One past the last offset already searched for "\r\n" / a blank line.
    next_line_search: usize,
    multiple_lines_search: usize,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        ReceiveBuffer {
            data: BytesMut::new(),
            next_line_search: 0,
            multiple_lines_search: 0,
        }
    }

    pub fn add(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy of everything still unprocessed, for `trailing_data`.
    pub fn peek(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data)
    }

    fn extract(&mut self, count: usize) -> Bytes {
        let out = self.data.split_to(count.min(self.data.len())).freeze();
        self.next_line_search = 0;
        self.multiple_lines_search = 0;
        out
    }

    pub fn maybe_extract_at_most(&mut self, count: usize) -> Option<Bytes> {
        if count == 0 || self.data.is_empty() {
            None
        } else {
            Some(self.extract(count))
        }
    }

    /// Extract through the next "\r\n", inclusive. Strict CRLF; used for
    /// chunk headers, where bare LF is not tolerated.
    pub fn maybe_extract_next_line(&mut self) -> Option<Bytes> {
        // Back up one byte in case the \r arrived in the previous call.
        let search_start = self.next_line_search.saturating_sub(1);
        match self.data[search_start..]
            .windows(2)
            .position(|window| window == b"\r\n")
        {
            Some(idx) => Some(self.extract(search_start + idx + 2)),
            None => {
                self.next_line_search = self.data.len();
                None
            }
        }
    }

    /// Extract a whole header block: every line up to (and consuming) the
    /// blank line that terminates it. Lines are returned without their
    /// endings; bare LF is accepted in place of CRLF.
    pub fn maybe_extract_lines(&mut self) -> Option<Vec<Bytes>> {
        // A block that starts with its own terminator is an empty block
        // (end of chunked trailers, most commonly).
        if self.data.first() == Some(&b'\n') {
            self.extract(1);
            return Some(Vec::new());
        }
        if self.data.starts_with(b"\r\n") {
            self.extract(2);
            return Some(Vec::new());
        }
        match BLANK_LINE_RE.find(&self.data[self.multiple_lines_search..]) {
            None => {
                // The tail could hold a partial terminator.
                self.multiple_lines_search = self.data.len().saturating_sub(2);
                None
            }
            Some(found) => {
                let end = self.multiple_lines_search + found.end();
                let block = self.extract(end);
                let mut lines = Vec::new();
                let mut start = 0;
                for (idx, &byte) in block.iter().enumerate() {
                    if byte == b'\n' {
                        let mut line_end = idx;
                        if line_end > start && block[line_end - 1] == b'\r' {
                            line_end -= 1;
                        }
                        lines.push(block.slice(start..line_end));
                        start = idx + 1;
                    }
                }
                lines.push(block.slice(start..));
                // The terminator contributes two empty lines; drop them.
                debug_assert_eq!(lines[lines.len() - 1], lines[lines.len() - 2]);
                lines.pop();
                lines.pop();
                Some(lines)
            }
        }
    }

    /// A request line can never begin with a control byte or a space, so a
    /// garbage first byte is reportable before a full line has arrived.
    pub fn next_line_obviously_invalid(&self) -> bool {
        match self.data.first() {
            Some(&byte) => byte < 0x21,
            None => false,
        }
    }
}
