//! Streamlike facade: presents an [`Index`] as a uniform read/seek byte
//! source plus a checkpoint directory.
//!
//! `seek` only records the target; the jump happens lazily inside the next
//! `read`, so a caller that seeks repeatedly before ever reading (or seeks
//! and then drops the facade) never pays for more than the last jump.

use crate::checkpoint::Checkpoint;
use crate::error::{Error, Result};
use crate::index::Index;
use crate::offset::Offset;

/// An opaque handle into the owning [`Index`]'s checkpoint list, as
/// returned by [`Facade::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointHandle(usize);

/// Presents an [`Index`] as a byte source with deferred `Set`-only seeking
/// and a read-only checkpoint directory.
pub struct Facade<'i, 's> {
    index: &'i mut Index<'s>,
    pending_seek: Option<u64>,
    errored: bool,
}

impl<'i, 's> Facade<'i, 's> {
    pub fn new(index: &'i mut Index<'s>) -> Self {
        Self {
            index,
            pending_seek: None,
            errored: false,
        }
    }

    /// Records `offset` as the next read's starting point. Repeated calls
    /// before a `read` collapse to the last one; nothing touches the
    /// underlying stream until a `read` actually happens.
    pub fn seek(&mut self, offset: u64) {
        self.pending_seek = Some(offset);
    }

    /// Current logical position: the pending seek target if one is queued,
    /// otherwise the index's actual position.
    pub fn tell(&self) -> u64 {
        self.pending_seek.unwrap_or_else(|| self.index.tell())
    }

    /// Reads up to `buf.len()` bytes, resolving any queued seek first.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(target) = self.pending_seek.take() {
            if let Err(e) = self.index.seek(target, None) {
                self.errored = true;
                return Err(e);
            }
        }
        match self.index.read(buf, None) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.errored = true;
                Err(e)
            }
        }
    }

    /// True once the underlying stream has been fully consumed and no seek
    /// is queued to move away from the end.
    pub fn eof(&self) -> bool {
        self.pending_seek.is_none() && self.index.state() == crate::index::StreamState::EndOfFile
    }

    /// True if the most recent `read`/deferred-`seek` resolution failed.
    pub fn error(&self) -> bool {
        self.errored
    }

    /// Total uncompressed length, once known (spec §3: "unknown" before the
    /// trailer is consumed or an imported file supplies it).
    pub fn length(&self) -> Option<u64> {
        self.index.uncompressed_size()
    }

    /// Number of checkpoints currently in the directory.
    pub fn checkpoint_count(&self) -> usize {
        self.index.checkpoints().count()
    }

    /// A handle to the `idx`-th checkpoint, in store order.
    pub fn checkpoint(&self, idx: usize) -> Option<CheckpointHandle> {
        if idx < self.checkpoint_count() {
            Some(CheckpointHandle(idx))
        } else {
            None
        }
    }

    fn checkpoint_ref(&self, handle: CheckpointHandle) -> Result<&Checkpoint> {
        self.index
            .checkpoints()
            .get(handle.0)
            .ok_or(Error::Params("stale checkpoint handle"))
    }

    /// The uncompressed-stream [`Offset`] a checkpoint handle resumes at.
    pub fn checkpoint_offset(&self, handle: CheckpointHandle) -> Result<Offset> {
        Ok(self.checkpoint_ref(handle)?.offset)
    }

    /// The history window bytes carried by a checkpoint handle.
    pub fn checkpoint_metadata(&self, handle: CheckpointHandle) -> Result<&[u8]> {
        Ok(self.checkpoint_ref(handle)?.window())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexBuilder, SpacingSpace};
    use crate::stream::SliceByteStream;
    use std::io::Write;

    fn gzip_bytes(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn deferred_seek_collapses_to_last_target() {
        let original: Vec<u8> = (0..50_000u32).map(|x| x as u8).collect();
        let compressed = gzip_bytes(&original);
        let mut stream = SliceByteStream::new(&compressed);
        let mut index = IndexBuilder::new().build(&mut stream).unwrap();
        index.build_index(4096, SpacingSpace::Uncompressed).unwrap();

        let mut facade = Facade::new(&mut index);
        facade.seek(10_000);
        facade.seek(20_000); // only this one should ever take effect
        assert_eq!(facade.tell(), 20_000);

        let mut buf = [0u8; 100];
        let n = facade.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &original[20_000..20_000 + n]);
    }

    #[test]
    fn checkpoint_directory_exposes_offsets_and_windows() {
        let original: Vec<u8> = (0..40_000u32).map(|x| (x * 3) as u8).collect();
        let compressed = gzip_bytes(&original);
        let mut stream = SliceByteStream::new(&compressed);
        let mut index = IndexBuilder::new().build(&mut stream).unwrap();
        index.build_index(2048, SpacingSpace::Uncompressed).unwrap();

        let facade = Facade::new(&mut index);
        assert!(facade.checkpoint_count() > 0);
        let handle = facade.checkpoint(0).unwrap();
        let offset = facade.checkpoint_offset(handle).unwrap();
        assert!(offset.uncomp > 0);
        let window = facade.checkpoint_metadata(handle).unwrap();
        assert!(window.len() <= 32_768);
        assert!(facade.checkpoint(facade.checkpoint_count()).is_none());
    }

    #[test]
    fn eof_reflects_index_state_not_pending_seek() {
        let original = b"short".to_vec();
        let compressed = gzip_bytes(&original);
        let mut stream = SliceByteStream::new(&compressed);
        let mut index = IndexBuilder::new().build(&mut stream).unwrap();

        let mut facade = Facade::new(&mut index);
        let mut buf = [0u8; 16];
        loop {
            let n = facade.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
        }
        assert!(facade.eof());
        facade.seek(0);
        assert!(!facade.eof());
    }
}
