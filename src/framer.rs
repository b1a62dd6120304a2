//! Line framing over a raw byte stream.
//!
//! The framer accumulates bytes read from the transport and yields complete
//! lines terminated by CR, LF, or CRLF. Bytes after the last terminator are
//! retained and prepended to the next read. Overlong lines are abandoned and
//! the framer resynchronizes at the next terminator.

use bytes::{Bytes, BytesMut};

use crate::error::ProtocolError;

/// Soft cap on a single framed line.
///
/// Large enough for IRCv3 `message-tags` traffic from servers that pad the
/// 512-byte body with a tag section.
pub const MAX_LINE_LEN: usize = 4096;

/// Result of asking the framer for the next line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Framed {
    /// A complete line, terminators stripped. Empty lines are never yielded.
    Line(Bytes),
    /// No complete line buffered; read more from the transport.
    Incomplete,
    /// The stream ended and every buffered line has been drained.
    Eof,
}

/// Accumulates transport bytes and splits them into IRC lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: BytesMut,
    eof: bool,
    /// Set after an overlong line; discard through the next terminator.
    discarding: bool,
}

impl LineFramer {
    /// Create an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulation buffer, for the transport to append into.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Append a chunk of raw bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Record that the transport reached end-of-stream.
    ///
    /// Buffered complete lines (and a final unterminated fragment) are still
    /// yielded before [`Framed::Eof`].
    pub fn mark_eof(&mut self) {
        self.eof = true;
    }

    /// Whether end-of-stream has been recorded.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Drop all buffered state, keeping the allocation.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.eof = false;
        self.discarding = false;
    }

    /// Extract the next complete line.
    ///
    /// Returns [`ProtocolError::LineTooLong`] once per abandoned line; the
    /// framer remains usable and resynchronizes on the next terminator.
    pub fn next_line(&mut self) -> Result<Framed, ProtocolError> {
        loop {
            let terminator = self.buf.iter().position(|&b| b == b'\r' || b == b'\n');

            match terminator {
                Some(pos) => {
                    let line = self.buf.split_to(pos).freeze();
                    let _ = self.buf.split_to(1);

                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    if pos > MAX_LINE_LEN {
                        return Err(ProtocolError::LineTooLong {
                            length: pos,
                            cap: MAX_LINE_LEN,
                        });
                    }
                    if line.is_empty() {
                        continue;
                    }
                    return Ok(Framed::Line(line));
                }
                None => {
                    if self.buf.len() > MAX_LINE_LEN {
                        let length = self.buf.len();
                        self.buf.clear();
                        if self.discarding {
                            // Still inside a line already reported as overlong.
                            continue;
                        }
                        self.discarding = true;
                        return Err(ProtocolError::LineTooLong {
                            length,
                            cap: MAX_LINE_LEN,
                        });
                    }
                    if self.eof {
                        if self.buf.is_empty() || self.discarding {
                            self.buf.clear();
                            return Ok(Framed::Eof);
                        }
                        // Final unterminated fragment.
                        let line = self.buf.split_to(self.buf.len()).freeze();
                        return Ok(Framed::Line(line));
                    }
                    return Ok(Framed::Incomplete);
                }
            }
        }
    }
}
