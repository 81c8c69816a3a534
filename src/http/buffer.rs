//! Connection read buffer.

use std::ops::Range;

/// Fixed-capacity byte window with a consumed prefix.
///
/// Valid bytes live in `buf[start..end]`. Before a refill the window is
/// compacted to the front; if it already starts at 0 and is full, the
/// backing storage doubles so a long line can still be assembled.
#[derive(Debug)]
pub struct ReadBuffer {
    buf: Vec<u8>,
    start: usize,
    end: usize,
}

impl ReadBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: vec![0; capacity.max(1)], start: 0, end: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn buffered(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len());
        self.start += n.min(self.len());
    }

    /// Bytes at an absolute range previously returned by [`find_line`](Self::find_line).
    ///
    /// Only valid until the next [`spare`](Self::spare) call.
    pub fn slice(&self, range: Range<usize>) -> &[u8] {
        &self.buf[range]
    }

    /// Copies as much buffered data as fits into `dst`.
    pub fn copy_to(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len());
        dst[..n].copy_from_slice(&self.buf[self.start..self.start + n]);
        self.start += n;
        n
    }

    /// Looks for a complete line in the buffered bytes.
    ///
    /// On success the line (without LF or trailing CR) is consumed and its
    /// absolute range returned.
    pub fn find_line(&mut self) -> Option<Range<usize>> {
        let offset = self.buffered().iter().position(|&b| b == b'\n')?;
        let line_start = self.start;
        let lf = line_start + offset;
        let line_end = if offset > 0 && self.buf[lf - 1] == b'\r' { lf - 1 } else { lf };
        self.start = lf + 1;
        Some(line_start..line_end)
    }

    /// Free space to read into, making room first.
    pub fn spare(&mut self) -> &mut [u8] {
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
        if self.end == self.buf.len() {
            if self.start > 0 {
                self.buf.copy_within(self.start..self.end, 0);
                self.end -= self.start;
                self.start = 0;
            } else {
                let doubled = self.buf.len() * 2;
                self.buf.resize(doubled, 0);
            }
        }
        &mut self.buf[self.end..]
    }

    pub fn advance_end(&mut self, n: usize) {
        debug_assert!(self.end + n <= self.buf.len());
        self.end += n;
    }
}
