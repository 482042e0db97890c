//! Abstract byte-level I/O collaborator (spec §4.1 / §6.2).
//!
//! `ByteStream` stands in for the `zidx_compressed_stream` /
//! `zidx_index_stream` callback tables of the original `libzidx` API
//! (`examples/original_source/src/zidx.h`): any backing source — a file, an
//! in-memory buffer, a network range-read — can implement it.

use crate::error::{Error, Result};

/// Reference point for [`ByteStream::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Offset relative to the start of the stream.
    Set,
    /// Offset relative to the current position.
    Cur,
    /// Offset relative to the end of the stream.
    End,
}

/// A read/write/seekable byte source or sink.
///
/// `read`/`write` may return short counts without necessarily signalling an
/// error; callers must additionally consult [`ByteStream::error`] and
/// [`ByteStream::eof`] to disambiguate a short read from EOF from a genuine
/// I/O failure, exactly as the original stream-callback contract does.
pub trait ByteStream {
    /// Reads up to `buf.len()` bytes, returning the number actually read.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Writes up to `buf.len()` bytes, returning the number actually written.
    fn write(&mut self, buf: &[u8]) -> usize;

    /// Repositions the stream. Returns the new absolute offset on success.
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64>;

    /// Current absolute offset.
    fn tell(&self) -> Result<u64>;

    /// Whether the stream has been read to its end.
    fn eof(&self) -> bool;

    /// Whether a prior `read`/`write`/`seek` failed.
    fn error(&self) -> bool;

    /// Total length of the stream, when known.
    ///
    /// The core currently assumes finite streams; "continuous/unknown"
    /// length is representable (`None`) but not exercised.
    fn length(&self) -> Option<u64>;
}

/// Reads a stream until `buf` is full, an error is reported, or EOF is hit.
///
/// Retries short reads within a bounded number of attempts so a `ByteStream`
/// that dribbles out a handful of bytes per call (a socket, a pipe) is still
/// usable; a `ByteStream` that makes no progress for this many consecutive
/// calls is treated as a stalled/erroring source rather than looped on
/// forever.
pub(crate) fn read_fully(stream: &mut dyn ByteStream, mut buf: &mut [u8]) -> Result<usize> {
    const MAX_STALL_ATTEMPTS: u32 = 64;
    let total = buf.len();
    let mut stalls = 0u32;
    while !buf.is_empty() {
        let n = stream.read(buf);
        if n == 0 {
            if stream.error() {
                return Err(Error::StreamRead);
            }
            if stream.eof() {
                break;
            }
            stalls += 1;
            if stalls >= MAX_STALL_ATTEMPTS {
                return Err(Error::StreamRead);
            }
            continue;
        }
        stalls = 0;
        buf = &mut buf[n..];
    }
    Ok(total - buf.len())
}

/// A [`ByteStream`] backed by a plain [`std::fs::File`].
///
/// Grounded in the `zidx_raw_file_*` callbacks of
/// `examples/original_source/src/zidx.h`, which wire a `FILE*` into the
/// stream-callback table; this is the equivalent concrete adapter for a
/// standard file handle that the test suite reuses throughout.
pub struct FileByteStream {
    file: std::fs::File,
    length: Option<u64>,
    pos: u64,
    eof: bool,
    error: bool,
}

impl FileByteStream {
    /// Wraps an already-open file.
    pub fn new(file: std::fs::File) -> Self {
        let length = file.metadata().ok().map(|m| m.len());
        Self {
            file,
            length,
            pos: 0,
            eof: false,
            error: false,
        }
    }

    /// Opens `path` for reading.
    pub fn open(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        Ok(Self::new(std::fs::File::open(path)?))
    }

    /// Creates (truncating) `path` for writing, e.g. to export an index.
    pub fn create(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        Ok(Self::new(std::fs::File::create(path)?))
    }
}

impl ByteStream for FileByteStream {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        use std::io::Read;
        match self.file.read(buf) {
            Ok(0) => {
                self.eof = true;
                0
            }
            Ok(n) => {
                self.pos += n as u64;
                n
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => 0,
            Err(_) => {
                self.error = true;
                0
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        use std::io::Write;
        match self.file.write(buf) {
            Ok(n) => {
                self.pos += n as u64;
                n
            }
            Err(_) => {
                self.error = true;
                0
            }
        }
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        use std::io::Seek;
        let pos = match whence {
            Whence::Set => std::io::SeekFrom::Start(offset.max(0) as u64),
            Whence::Cur => std::io::SeekFrom::Current(offset),
            Whence::End => std::io::SeekFrom::End(offset),
        };
        let new_pos = self.file.seek(pos).map_err(|_| {
            self.error = true;
            Error::StreamSeek
        })?;
        self.pos = new_pos;
        self.eof = false;
        Ok(new_pos)
    }

    fn tell(&self) -> Result<u64> {
        Ok(self.pos)
    }

    fn eof(&self) -> bool {
        self.eof
    }

    fn error(&self) -> bool {
        self.error
    }

    fn length(&self) -> Option<u64> {
        self.length
    }
}

/// A [`ByteStream`] backed by an in-memory buffer, primarily for tests.
pub struct SliceByteStream<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceByteStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> ByteStream for SliceByteStream<'a> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    fn write(&mut self, _buf: &[u8]) -> usize {
        0
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let base = match whence {
            Whence::Set => 0i64,
            Whence::Cur => self.pos as i64,
            Whence::End => self.data.len() as i64,
        };
        let new_pos = base + offset;
        if new_pos < 0 || new_pos as usize > self.data.len() {
            return Err(Error::StreamSeek);
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn tell(&self) -> Result<u64> {
        Ok(self.pos as u64)
    }

    fn eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn error(&self) -> bool {
        false
    }

    fn length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

/// A growable in-memory [`ByteStream`], used to export an index into memory
/// and to stand in for an on-disk index stream in tests.
#[derive(Default)]
pub struct VecByteStream {
    data: Vec<u8>,
    pos: usize,
}

impl VecByteStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl ByteStream for VecByteStream {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.data.len().saturating_sub(self.pos));
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        buf.len()
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let base = match whence {
            Whence::Set => 0i64,
            Whence::Cur => self.pos as i64,
            Whence::End => self.data.len() as i64,
        };
        let new_pos = base + offset;
        if new_pos < 0 {
            return Err(Error::StreamSeek);
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn tell(&self) -> Result<u64> {
        Ok(self.pos as u64)
    }

    fn eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn error(&self) -> bool {
        false
    }

    fn length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_stream_round_trip_seek() {
        let data = [1u8, 2, 3, 4, 5];
        let mut s = SliceByteStream::new(&data);
        let mut buf = [0u8; 2];
        assert_eq!(s.read(&mut buf), 2);
        assert_eq!(buf, [1, 2]);
        s.seek(0, Whence::Set).unwrap();
        assert_eq!(s.read(&mut buf), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(s.seek(-1, Whence::End).unwrap(), 4);
    }

    #[test]
    fn vec_stream_write_then_read() {
        let mut s = VecByteStream::new();
        assert_eq!(s.write(&[9, 8, 7]), 3);
        s.seek(0, Whence::Set).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(s.read(&mut buf), 3);
        assert_eq!(buf, [9, 8, 7]);
    }

    #[test]
    fn read_fully_stops_at_eof() {
        let data = [1u8, 2, 3];
        let mut s = SliceByteStream::new(&data);
        let mut buf = [0u8; 10];
        let n = read_fully(&mut s, &mut buf).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], &data);
    }
}
