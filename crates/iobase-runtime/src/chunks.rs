//! Sequential file readers
//!
//! [`ChunkIterator`] reads a descriptor in fixed-size pieces through one
//! reusable buffer. [`PartIterator`] layers delimiter splitting on top,
//! stitching records that straddle chunk boundaries.
//!
//! Both are lending iterators: `next()` hands out a slice that borrows
//! the iterator, so it must be consumed before the next call. Any read
//! error other than `EINTR` is logged and ends iteration for good.

use std::ops::Range;
use std::os::unix::io::{AsRawFd, BorrowedFd};

use iobase_core::blob::{self, Blob};
use iobase_core::{kerror, ktrace};

use crate::file::File;
use crate::sys::{self, AlignedBuf};

pub struct ChunkIterator<'f> {
    /// `None` once exhausted
    fd: Option<BorrowedFd<'f>>,
    len: usize,
    offset: usize,
    buf: AlignedBuf,
    /// whole buffers are read so direct I/O sees aligned lengths
    direct: bool,
    filled: usize,
}

impl<'f> ChunkIterator<'f> {
    /// Iterate `file` from offset 0 to its current length.
    ///
    /// For direct-mode files the chunk size is rounded up to the direct
    /// I/O block size.
    pub fn new(file: &'f File, chunk_size: usize) -> Self {
        let fd = if file.is_ok() && file.fd() >= 0 {
            // Safety: the descriptor lives as long as `file`, which outlives 'f.
            Some(unsafe { BorrowedFd::borrow_raw(file.fd()) })
        } else {
            None
        };
        let len = if fd.is_some() { file.len() } else { 0 };
        Self::with_fd(fd, 0, len, chunk_size, file.mode().is_direct())
    }

    /// Iterate `len` bytes of `fd` starting at `offset`.
    pub fn from_fd(fd: BorrowedFd<'f>, offset: usize, len: usize, chunk_size: usize) -> Self {
        Self::with_fd(Some(fd), offset, offset.saturating_add(len), chunk_size, false)
    }

    fn with_fd(
        fd: Option<BorrowedFd<'f>>,
        offset: usize,
        end: usize,
        chunk_size: usize,
        direct: bool,
    ) -> Self {
        let chunk_size = chunk_size.max(1);
        let buf = if direct {
            AlignedBuf::new(sys::align_up(chunk_size, sys::DIRECT_ALIGN), sys::DIRECT_ALIGN)
        } else {
            AlignedBuf::new(chunk_size, 1)
        };
        Self { fd, len: end, offset, buf, direct, filled: 0 }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.fd.is_some()
    }

    /// Absolute file offset of the next read.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Read the next chunk into the buffer. Returns its length.
    pub fn advance(&mut self) -> Option<usize> {
        let fd = self.fd?;
        self.filled = 0;

        if self.offset >= self.len {
            self.fd = None;
            return None;
        }

        let remaining = self.len - self.offset;
        let want = if self.direct { self.buf.len() } else { self.buf.len().min(remaining) };
        match sys::pread(fd.as_raw_fd(), &mut self.buf[..want], self.offset) {
            Ok(0) => {
                ktrace!("chunk eof at {}", self.offset);
                self.fd = None;
                None
            }
            Ok(n) => {
                let n = n.min(remaining);
                self.offset += n;
                self.filled = n;
                Some(n)
            }
            Err(e) => {
                kerror!("read fd {} at {}: {}", fd.as_raw_fd(), self.offset, e);
                self.fd = None;
                None
            }
        }
    }

    /// The chunk produced by the last `advance`.
    #[inline]
    pub fn current(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    pub fn next(&mut self) -> Option<&[u8]> {
        self.advance()?;
        Some(self.current())
    }
}

/// Where the next record lives once `step` has run.
enum Emit {
    Carry(Range<usize>),
    Chunk(Range<usize>),
    Done,
}

pub struct PartIterator<'f> {
    chunks: ChunkIterator<'f>,
    delim: Vec<u8>,
    /// bytes read but not yet part of an emitted record
    carry: Blob<'static>,
    /// prefix of `carry` already emitted
    consumed: usize,
    finished: bool,
}

impl<'f> PartIterator<'f> {
    pub fn new(file: &'f File, delim: &[u8], chunk_size: usize) -> Self {
        Self::from_chunks(ChunkIterator::new(file, chunk_size), delim)
    }

    pub fn from_chunks(chunks: ChunkIterator<'f>, delim: &[u8]) -> Self {
        Self {
            chunks,
            delim: delim.to_vec(),
            carry: Blob::new(),
            consumed: 0,
            finished: false,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.finished
    }

    /// Next non-empty record, without its delimiter.
    ///
    /// Adjacent delimiters collapse: `"a,,b"` yields `"a"` then `"b"`.
    /// Trailing bytes with no closing delimiter come out as a final record.
    pub fn next(&mut self) -> Option<&[u8]> {
        match self.step() {
            Emit::Carry(r) => Some(&self.carry.data()[r]),
            Emit::Chunk(r) => Some(&self.chunks.current()[r]),
            Emit::Done => None,
        }
    }

    fn step(&mut self) -> Emit {
        if self.finished {
            return Emit::Done;
        }

        loop {
            if let Some(r) = self.record_in_carry() {
                return Emit::Carry(r);
            }

            if self.consumed > 0 {
                self.carry.chop(self.consumed);
                self.consumed = 0;
            }

            let Some(n) = self.chunks.advance() else {
                self.finished = true;
                if self.carry.is_empty() {
                    return Emit::Done;
                }
                return Emit::Carry(0..self.carry.len());
            };

            if self.delim.is_empty() {
                return Emit::Chunk(0..n);
            }

            let chunk = self.chunks.current();
            if self.carry.is_empty() {
                let start = skip_delims(chunk, 0, &self.delim);
                if let Some(end) = blob::find(&chunk[start..], &self.delim).map(|p| p + start) {
                    self.carry.append(&chunk[end + self.delim.len()..]);
                    return Emit::Chunk(start..end);
                }
            }
            self.carry.append(chunk);
        }
    }

    fn record_in_carry(&mut self) -> Option<Range<usize>> {
        let data = self.carry.data();
        self.consumed = skip_delims(data, self.consumed, &self.delim);

        let start = self.consumed;
        let end = blob::find(&data[start..], &self.delim)? + start;
        self.consumed = end + self.delim.len();
        Some(start..end)
    }
}

/// Offset of the first byte at or after `from` that does not begin a delimiter.
fn skip_delims(hay: &[u8], mut from: usize, delim: &[u8]) -> usize {
    if delim.is_empty() {
        return from;
    }
    while hay[from..].starts_with(delim) {
        from += delim.len();
    }
    from
}
