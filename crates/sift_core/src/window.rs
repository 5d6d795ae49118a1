//! Window Reader: presents the source as a sequence of overlapping windows.
//!
//! Each window is `[tail of previous window] + [newly read chunk]`, where the
//! tail is `lookback` bytes long (longest start marker minus one). A window
//! *owns* the start positions in `[0, len - tail)`; the trailing positions are
//! re-examined by the next window, where the carried tail puts them at the
//! front. Owned ranges of consecutive windows partition the stream, so every
//! start offset is examined exactly once and every owned marker is fully
//! contained in its window.
//!
//! ```text
//!   window k     |------------ owned ------------|-- tail --|
//!   window k+1                                   |-- tail --|----- new chunk -----|
//! ```
//!
//! Once the source is exhausted the remaining tail is emitted once more as a
//! final window that owns all of its bytes.

use crate::error::{CoreError, Result};
use crate::traits::BlockSource;
use crate::types::StreamOffset;
use std::io;

#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    bytes: &'a [u8],
    base: StreamOffset,
    owned: usize,
    is_final: bool,
}

impl<'a> Window<'a> {
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Stream offset of `bytes()[0]`.
    #[inline]
    #[must_use]
    pub fn base(&self) -> StreamOffset {
        self.base
    }

    /// Number of leading positions whose matches this window reports.
    #[inline]
    #[must_use]
    pub fn owned_len(&self) -> usize {
        self.owned
    }

    #[inline]
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Stream offset one past the last byte.
    #[inline]
    #[must_use]
    pub fn end(&self) -> StreamOffset {
        self.base + self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Reading,
    Flushed,
    Done,
}

#[derive(Debug)]
pub struct WindowReader {
    chunk_size: usize,
    buffer: Vec<u8>,
    lookback: usize,
    len: usize,
    owned: usize,
    base: StreamOffset,
    cursor: StreamOffset,
    state: State,
}

impl WindowReader {
    pub fn new(chunk_size: usize, lookback: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(CoreError::InvalidConfig("chunk size must be non-zero".into()));
        }
        Ok(Self {
            chunk_size,
            buffer: vec![0u8; lookback + chunk_size],
            lookback,
            len: 0,
            owned: 0,
            base: 0,
            cursor: 0,
            state: State::Reading,
        })
    }

    /// Stream offset of the next byte to be read from the source.
    #[inline]
    #[must_use]
    pub fn position(&self) -> StreamOffset {
        self.cursor
    }

    /// Produces the next window, or `None` once the final window has been
    /// handed out.
    pub fn next<S: BlockSource + ?Sized>(&mut self, source: &mut S) -> Result<Option<Window<'_>>> {
        if self.state == State::Done {
            return Ok(None);
        }

        // Carry the un-owned suffix of the previous window to the front.
        self.buffer.copy_within(self.owned..self.len, 0);
        self.base += self.owned as u64;
        self.len -= self.owned;
        self.owned = 0;

        if self.state == State::Flushed {
            self.state = State::Done;
            return Ok(None);
        }

        let n = self.fill(source)?;

        if n == 0 {
            self.state = State::Flushed;
            if self.len == 0 {
                self.state = State::Done;
                return Ok(None);
            }
            self.owned = self.len;
            return Ok(Some(Window {
                bytes: &self.buffer[..self.len],
                base: self.base,
                owned: self.owned,
                is_final: true,
            }));
        }

        self.cursor += n as u64;
        self.len += n;
        self.owned = self.len - self.lookback.min(self.len);

        Ok(Some(Window {
            bytes: &self.buffer[..self.len],
            base: self.base,
            owned: self.owned,
            is_final: false,
        }))
    }

    fn fill<S: BlockSource + ?Sized>(&mut self, source: &mut S) -> Result<usize> {
        let dest = &mut self.buffer[self.len..self.len + self.chunk_size];
        loop {
            match source.read_chunk(self.cursor, dest) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CoreError::read_at(self.cursor, e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SliceSource;

    fn collect(data: &[u8], chunk: usize, lookback: usize) -> Vec<(u64, Vec<u8>, usize, bool)> {
        let mut source = SliceSource::new(data.to_vec());
        let mut reader = WindowReader::new(chunk, lookback).unwrap();
        let mut windows = Vec::new();
        while let Some(w) = reader.next(&mut source).unwrap() {
            windows.push((w.base(), w.bytes().to_vec(), w.owned_len(), w.is_final()));
        }
        windows
    }

    #[test]
    fn first_window_has_no_tail() {
        let windows = collect(b"abcdefghij", 4, 2);
        assert_eq!(windows[0], (0, b"abcd".to_vec(), 2, false));
    }

    #[test]
    fn windows_carry_lookback_tail() {
        let windows = collect(b"abcdefghij", 4, 2);
        assert_eq!(
            windows,
            vec![
                (0, b"abcd".to_vec(), 2, false),
                (2, b"cdefgh".to_vec(), 4, false),
                (6, b"ghij".to_vec(), 2, false),
                (8, b"ij".to_vec(), 2, true),
            ]
        );
    }

    #[test]
    fn owned_ranges_partition_the_stream() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        for chunk in [1usize, 3, 7, 64, 999, 1000, 4096] {
            let mut next_owned = 0u64;
            for (base, bytes, owned, _) in collect(&data, chunk, 3) {
                assert_eq!(base, next_owned, "chunk {chunk}");
                assert_eq!(&bytes[..], &data[base as usize..base as usize + bytes.len()]);
                next_owned = base + owned as u64;
            }
            assert_eq!(next_owned, data.len() as u64, "chunk {chunk}");
        }
    }

    #[test]
    fn final_window_is_flushed_once() {
        let windows = collect(b"xyz", 8, 3);
        assert_eq!(
            windows,
            vec![(0, b"xyz".to_vec(), 0, false), (0, b"xyz".to_vec(), 3, true)]
        );
    }

    #[test]
    fn empty_source_yields_nothing() {
        assert!(collect(b"", 8, 3).is_empty());
    }

    #[test]
    fn zero_lookback_needs_no_flush() {
        let windows = collect(b"abcdef", 4, 0);
        assert_eq!(
            windows,
            vec![(0, b"abcd".to_vec(), 4, false), (4, b"ef".to_vec(), 2, false)]
        );
    }

    #[test]
    fn rejects_zero_chunk() {
        assert!(WindowReader::new(0, 3).is_err());
    }

    struct Broken;

    impl BlockSource for Broken {
        fn read_chunk(&mut self, _offset: u64, _buffer: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("bad sector"))
        }

        fn size(&self) -> u64 {
            1
        }
    }

    #[test]
    fn read_errors_are_stream_errors() {
        let mut reader = WindowReader::new(16, 3).unwrap();
        let err = reader.next(&mut Broken).unwrap_err();
        assert!(matches!(err, CoreError::StreamRead { offset: 0, .. }));
    }
}
