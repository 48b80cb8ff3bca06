//! Line-oriented buffering over arbitrary chunk boundaries.
//!
//! Feed it text chunks as they arrive from the transport and it yields every
//! completed line exactly once, in order. A trailing partial line is kept
//! until its `\n` arrives; whatever is still pending when the stream ends is
//! discarded by [`ChunkBuffer::finish`].

use memchr::memchr_iter;
use tracing::{debug, warn};

const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

pub struct ChunkBuffer {
    buffer: String,
    read_offset: usize,
    max_line_bytes: usize,
    /// Bytes of the current line already thrown away because it overflowed.
    overflowed: usize,
}

impl ChunkBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }

    #[must_use]
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
            max_line_bytes: max_line_bytes.max(1),
            overflowed: 0,
        }
    }

    /// Feed a chunk and return the lines it completed.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed a chunk and append completed lines into a caller-provided buffer.
    ///
    /// Line terminators are stripped (`\n`, and a `\r` directly before it).
    /// Lines longer than the configured maximum are dropped whole, whichever
    /// way they were split across chunks.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<String>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let scan_start = processed_up_to;
        let bytes = self.buffer.as_bytes();
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            let full_len = self.overflowed + line.len();
            if full_len > self.max_line_bytes {
                warn!(
                    line_bytes = full_len,
                    max_line_bytes = self.max_line_bytes,
                    "dropping oversize stream line"
                );
            } else {
                out.push(line.to_owned());
            }
            self.overflowed = 0;
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }

        // The pending tail alone is already too long: keep counting its
        // length but stop holding its bytes.
        let pending = self.buffer.len() - self.read_offset;
        if self.overflowed + pending > self.max_line_bytes + 1 {
            self.overflowed += pending;
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }

        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Bytes of the current partial line (including any already dropped).
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.overflowed + (self.buffer.len() - self.read_offset)
    }

    /// End of stream: discard the trailing partial line, if any.
    ///
    /// Returns the number of bytes discarded.
    pub fn finish(&mut self) -> usize {
        let discarded = self.pending_len();
        if discarded > 0 {
            debug!(
                discarded_bytes = discarded,
                "discarding unterminated trailing line"
            );
        }
        self.buffer.clear();
        self.read_offset = 0;
        self.overflowed = 0;
        discarded
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}
