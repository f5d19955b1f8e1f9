//! Seekable wrapper over a forward-only stream.
//!
//! LZW-compressed content may be re-read by strip, so the provider wraps
//! the raw stream in a [`RandomAccessStream`]: every byte read from the
//! source is cached, and seeking inside the cached region is free. Seeking
//! forward past the cache pulls the missing bytes from the source.

use std::io::{self, Read, Seek, SeekFrom};

/// Chunk pulled from the source when the cache has to grow.
const FILL_CHUNK: usize = 64 * 1024;

/// Caching `Read + Seek` adapter.
pub struct RandomAccessStream<R> {
    inner: R,
    cache: Vec<u8>,
    pos: u64,
    eof: bool,
}

impl<R: Read> RandomAccessStream<R> {
    /// Wraps `inner`; nothing is read until the first access.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: Vec::new(),
            pos: 0,
            eof: false,
        }
    }

    /// Bytes cached so far.
    #[inline]
    pub fn cached_len(&self) -> u64 {
        self.cache.len() as u64
    }

    /// Reads from the source until `target` bytes are cached or it ends.
    fn fill_to(&mut self, target: u64) -> io::Result<()> {
        let mut chunk = [0u8; FILL_CHUNK];
        while !self.eof && self.cached_len() < target {
            let n = self.inner.read(&mut chunk)?;
            if n == 0 {
                self.eof = true;
            } else {
                self.cache.extend_from_slice(&chunk[..n]);
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for RandomAccessStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.fill_to(self.pos.saturating_add(buf.len() as u64))?;
        let start = self.pos.min(self.cached_len()) as usize;
        let n = (self.cache.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&self.cache[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read> Seek for RandomAccessStream<R> {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let next = match target {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                self.fill_to(u64::MAX)?;
                self.cached_len().checked_add_signed(delta)
            }
        };
        let next = next.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
        })?;
        self.pos = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_seek_back_rereads_cache() {
        let mut s = RandomAccessStream::new(Cursor::new((0u8..100).collect::<Vec<_>>()));
        let mut buf = [0u8; 10];
        s.read_exact(&mut buf).expect("read");
        assert_eq!(buf[9], 9);
        s.seek(SeekFrom::Start(5)).expect("seek");
        s.read_exact(&mut buf).expect("read");
        assert_eq!(buf, [5, 6, 7, 8, 9, 10, 11, 12, 13, 14]);
    }

    #[test]
    fn test_seek_end_and_past_end() {
        let mut s = RandomAccessStream::new(Cursor::new(vec![1u8; 20]));
        assert_eq!(s.seek(SeekFrom::End(-4)).expect("seek"), 16);
        let mut rest = Vec::new();
        s.read_to_end(&mut rest).expect("read");
        assert_eq!(rest.len(), 4);
        s.seek(SeekFrom::Start(50)).expect("seek");
        assert_eq!(s.read(&mut [0u8; 4]).expect("read"), 0);
        assert!(s.seek(SeekFrom::Current(-100)).is_err());
    }
}
