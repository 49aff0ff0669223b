// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Splits a TCP byte stream into individual CoT documents.
//!
//! Streaming clients write documents back to back with no length prefix:
//! ```text
//! <?xml ...?><event ...>...</event><event .../>\n<?xml ...?><event ...>
//! ```
//! A document is an optional prolog (`<?...?>`, comments, doctype) followed
//! by one root element, running to the matching `</name>` or to the `/>` of a
//! self-closing root. Quoted attribute values are skipped when looking for
//! the end of a tag. Roots other than `<event>` (`<auth>`, `<events>`) are
//! framed the same way and left for the decoder to reject. Whitespace between
//! documents is skipped. Anything else between documents means the stream is
//! out of sync and cannot be recovered.

use super::CotError;
use bytes::{Buf, Bytes, BytesMut};

/// Incremental document splitter.
#[derive(Debug)]
pub struct EventFramer {
    buffer: BytesMut,
    max_size: usize,
}

impl EventFramer {
    /// Create a framer that rejects documents larger than `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_size,
        }
    }

    /// Buffer to read socket data into.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Whether only whitespace is left in the buffer.
    pub fn is_idle(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }

    /// Extract the next complete document, if one has been fully received.
    ///
    /// Returns `Err` when the stream can no longer be framed.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, CotError> {
        let skip = self
            .buffer
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        self.buffer.advance(skip);

        let Some(&first) = self.buffer.first() else {
            return Ok(None);
        };
        if first != b'<' {
            return Err(CotError::Framing(format!(
                "unexpected byte 0x{:02x} between documents",
                first
            )));
        }

        match self.frame_end()? {
            Some(end) if end <= self.max_size => Ok(Some(self.buffer.split_to(end).freeze())),
            None if self.buffer.len() <= self.max_size => Ok(None),
            _ => Err(CotError::Framing(format!(
                "document exceeds {} bytes",
                self.max_size
            ))),
        }
    }

    /// Length of the first complete document in the buffer.
    fn frame_end(&self) -> Result<Option<usize>, CotError> {
        let buf = &self.buffer[..];
        let mut pos = 0;

        loop {
            pos += buf[pos..]
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            let rest = &buf[pos..];
            if rest.len() < 2 {
                return Ok(None);
            }
            if rest[0] != b'<' {
                return Err(CotError::Framing(format!(
                    "unexpected byte 0x{:02x} after prolog",
                    rest[0]
                )));
            }

            // Prolog, comments and doctype belong to the document that follows
            let skipped = match rest[1] {
                b'?' => find(rest, b"?>", 2).map(|end| end + 2),
                b'!' if rest.len() < 4 => return Ok(None),
                b'!' if rest.starts_with(b"<!--") => find(rest, b"-->", 4).map(|end| end + 3),
                b'!' => find_tag_end(rest, 2).map(|end| end + 1),
                _ => return Ok(element_end(rest)?.map(|end| pos + end)),
            };
            match skipped {
                Some(len) => pos += len,
                None => return Ok(None),
            }
        }
    }
}

/// Length of the element starting at `buf[0] == b'<'`, if complete.
fn element_end(buf: &[u8]) -> Result<Option<usize>, CotError> {
    let Some(name_len) = buf[1..]
        .iter()
        .position(|&b| b.is_ascii_whitespace() || b == b'>' || b == b'/')
    else {
        return Ok(None);
    };
    if name_len == 0 {
        return Err(CotError::Framing("element without a name".into()));
    }
    let name = &buf[1..1 + name_len];

    let Some(tag_end) = find_tag_end(buf, 1 + name_len) else {
        return Ok(None);
    };
    if buf[tag_end - 1] == b'/' {
        return Ok(Some(tag_end + 1));
    }

    Ok(find_close_tag(buf, name, tag_end + 1))
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

/// Position of the `>` closing a tag, skipping quoted attribute values.
fn find_tag_end(buf: &[u8], from: usize) -> Option<usize> {
    let mut quote = None;
    for (i, &b) in buf.iter().enumerate().skip(from) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i),
            None => {}
        }
    }
    None
}

/// End of the first `</name>` at or after `from`.
fn find_close_tag(buf: &[u8], name: &[u8], from: usize) -> Option<usize> {
    let mut at = from;
    while let Some(pos) = find(buf, b"</", at) {
        let after = pos + 2 + name.len();
        let candidate = buf.get(pos + 2..after)?;
        if candidate == name {
            let tail = &buf[after..];
            let ws = tail.iter().take_while(|b| b.is_ascii_whitespace()).count();
            match tail.get(ws) {
                Some(b'>') => return Some(after + ws + 1),
                None => return None,
                Some(_) => {}
            }
        }
        at = pos + 2;
    }
    None
}
