// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity line buffer that reads back as a single byte stream.
//!
//! A [`LineBatch`] is filled by the producer one line at a time and then handed
//! to a sink, which drains it front-to-back. The serialized form is every stored
//! line followed by a single `\n`:
//!
//! ```text
//! lines: ["a", "b", "c"]   ->   b"a\nb\nc\n"   (size = 6)
//! ```
//!
//! The concatenated payload is never built. Reads copy directly out of the
//! stored lines, so a batch can back a streaming upload of known length.

use std::io;

/// Outcome of a [`LineBatch::read_chunk`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Bytes remain after this call.
    More,
    /// Every line and its trailing newline has been emitted.
    Exhausted,
}

/// A bounded, append-only group of raw lines destined for one object.
///
/// Writes and reads use separate cursors. A batch is written completely by the
/// producer before the sink reads it once, from the start, to the end. Reading
/// cannot be restarted.
#[derive(Debug)]
pub struct LineBatch {
    name: String,
    lines: Vec<Vec<u8>>,
    capacity: usize,
    /// Optional ceiling on `size`; `None` bounds the batch by line count only.
    max_bytes: Option<u64>,
    /// Serialized length: sum of `line.len() + 1` over stored lines.
    size: u64,

    // read side
    read_line: usize,
    read_offset: usize,
    emitted: u64,
}

impl LineBatch {
    /// Creates an empty batch holding at most `capacity` lines.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self::with_max_bytes(name, capacity, None)
    }

    /// Creates an empty batch bounded by both line count and serialized size.
    ///
    /// A line that would push the batch past `max_bytes` is refused unless the
    /// batch is empty, so an oversized line still ships on its own.
    #[must_use]
    pub fn with_max_bytes(name: impl Into<String>, capacity: usize, max_bytes: Option<u64>) -> Self {
        LineBatch {
            name: name.into(),
            lines: Vec::with_capacity(capacity),
            capacity,
            max_bytes,
            size: 0,
            read_line: 0,
            read_offset: 0,
            emitted: 0,
        }
    }

    /// Appends `raw` with trailing newlines stripped.
    ///
    /// Returns `false` and leaves the batch untouched when it is full. The caller
    /// should ship this batch and start a new one.
    pub fn write_line(&mut self, raw: &[u8]) -> bool {
        if self.lines.len() >= self.capacity {
            return false;
        }

        let end = raw
            .iter()
            .rposition(|b| *b != b'\n')
            .map_or(0, |last| last + 1);
        let line = &raw[..end];
        let framed = line.len() as u64 + 1;

        if let Some(max_bytes) = self.max_bytes {
            if !self.lines.is_empty() && self.size + framed > max_bytes {
                return false;
            }
        }

        self.lines.push(line.to_vec());
        self.size += framed;
        true
    }

    /// Fills `buf` with the next bytes of the serialized batch.
    ///
    /// Resumes exactly where the previous call stopped, and may end partway
    /// through a line. The returned state is [`ReadState::Exhausted`] once the
    /// final newline has been emitted, including on every later call.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> (usize, ReadState) {
        let mut n = 0;

        while n < buf.len() && self.read_line < self.lines.len() {
            let line = &self.lines[self.read_line];
            if self.read_offset < line.len() {
                let take = (line.len() - self.read_offset).min(buf.len() - n);
                buf[n..n + take]
                    .copy_from_slice(&line[self.read_offset..self.read_offset + take]);
                self.read_offset += take;
                n += take;
            } else {
                buf[n] = b'\n';
                n += 1;
                self.read_line += 1;
                self.read_offset = 0;
            }
        }

        self.emitted += n as u64;
        (n, self.read_state())
    }

    fn read_state(&self) -> ReadState {
        if self.read_line >= self.lines.len() {
            ReadState::Exhausted
        } else {
            ReadState::More
        }
    }

    /// Number of stored lines.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lines.len()
    }

    /// Exact number of bytes the batch serializes to.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.lines.len() >= self.capacity
    }

    /// Bytes not yet handed out by reads.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.size - self.emitted
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.read_state() == ReadState::Exhausted
    }
}

impl io::Read for LineBatch {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (n, _) = self.read_chunk(buf);
        Ok(n)
    }
}
