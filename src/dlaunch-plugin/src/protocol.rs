//! Framing of the launcher/backend protocol.
//!
//! Requests are a prefix byte, text and a newline. A query is answered with a
//! single reply byte, optionally followed by a batch of items terminated by a
//! NUL byte.

use crate::items::Item;
use dlaunch_core::ActivationMode;
use thiserror::Error;

pub const QUERY_PREFIX: u8 = b'q';
pub const OPEN_PREFIX: u8 = b'o';
pub const OPEN_ALT_PREFIX: u8 = b'O';
pub const REPLY_FILTER: u8 = b'f';
pub const REPLY_CLEAR: u8 = b'c';
pub const END_OF_BATCH: u8 = 0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("unexpected reply byte 0x{0:02x}")]
    UnexpectedReply(u8),
    #[error("NUL byte inside an item line")]
    NulInsideLine,
    #[error("batch ended after a description without its action line")]
    UnterminatedRecord,
    #[error("could not grow the receive buffer by {requested} bytes")]
    BufferExhausted { requested: usize },
}

/// The backend's answer to a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// The new query refines the previous one; narrow the cached items.
    Filter,
    /// A fresh batch follows.
    Clear,
}

impl Reply {
    pub fn from_byte(byte: u8) -> Result<Self, FramingError> {
        match byte {
            REPLY_FILTER => Ok(Reply::Filter),
            REPLY_CLEAR => Ok(Reply::Clear),
            other => Err(FramingError::UnexpectedReply(other)),
        }
    }
}

pub fn encode_query(text: &str) -> Vec<u8> {
    frame(QUERY_PREFIX, text)
}

pub fn encode_activation(text: &str, mode: ActivationMode) -> Vec<u8> {
    let prefix = match mode {
        ActivationMode::Normal => OPEN_PREFIX,
        ActivationMode::Alternate => OPEN_ALT_PREFIX,
    };
    frame(prefix, text)
}

fn frame(prefix: u8, text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 2);
    out.push(prefix);
    // The frame is newline-terminated, so an embedded newline cannot be sent.
    out.extend(text.bytes().map(|b| if b == b'\n' { b' ' } else { b }));
    out.push(b'\n');
    out
}

/// Incremental parser for one item batch.
///
/// Bytes are appended as they arrive; only the unparsed tail is ever scanned
/// again, so a batch may be split across any number of reads.
#[derive(Debug, Default)]
pub struct BatchParser {
    buf: Vec<u8>,
    /// Start of the line currently being assembled.
    line_start: usize,
    /// Everything before this offset has been searched for a terminator.
    scanned: usize,
    pending_description: Option<String>,
    items: Vec<Item>,
    complete: bool,
}

impl BatchParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and parse as far as possible. Returns `true` once the
    /// terminating NUL has been seen.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<bool, FramingError> {
        if self.complete {
            if !bytes.is_empty() {
                tracing::debug!(len = bytes.len(), "discarding bytes after end of batch");
            }
            return Ok(true);
        }

        self.buf
            .try_reserve(bytes.len())
            .map_err(|_| FramingError::BufferExhausted {
                requested: bytes.len(),
            })?;
        self.buf.extend_from_slice(bytes);

        while let Some(offset) = self.buf[self.scanned..]
            .iter()
            .position(|&b| b == b'\n' || b == END_OF_BATCH)
        {
            let end = self.scanned + offset;
            if self.buf[end] == END_OF_BATCH {
                if end != self.line_start {
                    return Err(FramingError::NulInsideLine);
                }
                if self.pending_description.is_some() {
                    return Err(FramingError::UnterminatedRecord);
                }
                let trailing = self.buf.len() - end - 1;
                if trailing > 0 {
                    tracing::debug!(len = trailing, "discarding bytes after end of batch");
                }
                self.complete = true;
                self.buf = Vec::new();
                self.line_start = 0;
                self.scanned = 0;
                return Ok(true);
            }

            let line = &self.buf[self.line_start..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if !line.is_empty() {
                let line = String::from_utf8_lossy(line).into_owned();
                match self.pending_description.take() {
                    None => self.pending_description = Some(line),
                    Some(description) => self.items.push(Item::new(description, line)),
                }
            }
            self.line_start = end + 1;
            self.scanned = end + 1;
        }
        self.scanned = self.buf.len();
        self.compact();
        Ok(false)
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Records parsed so far.
    pub fn parsed(&self) -> usize {
        self.items.len()
    }

    pub fn into_items(self) -> Vec<Item> {
        self.items
    }

    /// Drop consumed bytes so the buffer only holds the partial line.
    fn compact(&mut self) {
        if self.line_start == 0 {
            return;
        }
        self.buf.drain(..self.line_start);
        self.scanned -= self.line_start;
        self.line_start = 0;
    }
}
