//! `Index`, the state machine at the center of the crate (spec §3 "Index",
//! §4.5), plus its configuration surface.
//!
//! Grounded in `zidx_index_init_advanced` and the `zidx_read`/`zidx_seek`/
//! `zidx_build_index` trio of `examples/original_source/src/zidx.c`; the
//! boundary-callback collaboration is re-expressed as a short-lived
//! `FnMut` borrowing a narrow [`BoundaryContext`] instead of a raw function
//! pointer plus `void*` user data, per spec §9.

use crate::checkpoint::{Checkpoint, CheckpointStore, MAX_WINDOW_LEN};
use crate::error::{Error, Result};
use crate::inflate::{raw_window_bits, window_bits_for, Flush, InflateDriver, StepOutcome};
use crate::offset::{Offset, OffsetTracker};
use crate::stream::{read_fully, ByteStream, Whence};

/// Which inflate-engine header framing to expect (spec §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// No header: the stream is raw DEFLATE blocks.
    Deflate,
    /// A 10+-byte gzip header and an 8-byte trailer.
    Gzip,
    /// Auto-detected: either a gzip header or a zlib header.
    GzipOrZlib,
}

/// How per-checkpoint checksums are computed (spec §3 "Index").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumMode {
    /// No checksum is accumulated; checkpoints carry `0`.
    Disabled,
    /// CRC-32, same as `ForceCrc32` (the only algorithm this core implements).
    Default,
    /// CRC-32, forced regardless of stream type.
    ForceCrc32,
    /// Adler-32. Named in the configuration surface but not implemented by
    /// this core, which only ever accumulates CRC-32 (spec §4.3).
    ForceAdler32,
}

/// The state machine driving `read`/`seek` (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Invalid,
    FileHeaders,
    DeflateBlocks,
    FileTrailer,
    EndOfFile,
}

/// Which axis `build_index`'s spacing threshold is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpacingSpace {
    Uncompressed,
    Compressed,
}

/// The narrow view a boundary callback gets of the owning [`Index`]: enough
/// to capture a checkpoint at the current boundary, nothing else (spec §9:
/// "operations on the Index passed by mutable borrow" rather than a
/// retained back-reference).
pub struct BoundaryContext<'a> {
    checkpoints: &'a mut CheckpointStore,
    inflate: &'a mut InflateDriver,
    tracker: &'a mut OffsetTracker,
}

impl<'a> BoundaryContext<'a> {
    fn new(
        checkpoints: &'a mut CheckpointStore,
        inflate: &'a mut InflateDriver,
        tracker: &'a mut OffsetTracker,
    ) -> Self {
        Self {
            checkpoints,
            inflate,
            tracker,
        }
    }

    /// Run length (uncompressed bytes) covered by the checksum that would be
    /// assigned to a checkpoint captured right now.
    pub fn checksum_run_len(&self) -> u64 {
        self.tracker.checksum_len()
    }

    /// Captures a checkpoint at `offset`: snapshots the inflate engine's
    /// current sliding-window dictionary and the accumulated running
    /// checksum, appends it to the store, and resets the running checksum
    /// ready for the next run (spec §4.3: "resets the running checksum to
    /// the initial value" on checkpoint emission).
    pub fn capture_checkpoint(&mut self, offset: Offset) -> Result<()> {
        let mut window = vec![0u8; MAX_WINDOW_LEN];
        let len = self.inflate.dictionary_copy(&mut window)?;
        window.truncate(len);
        let checksum_value = self.tracker.checksum_value();
        let ckp = Checkpoint::new(offset, window, checksum_value)?;
        self.checkpoints.add(ckp)?;
        self.tracker.take_checksum();
        Ok(())
    }
}

/// A boundary callback: invoked once per DEFLATE block boundary crossed
/// during `read`/`seek`/`build_index`, with the current offset and whether
/// this is the stream's last block. A non-`Ok` return short-circuits the
/// enclosing call (spec §5 "Cancellation").
pub type BoundaryCallback<'cb> = dyn FnMut(&mut BoundaryContext<'_>, Offset, bool) -> Result<()> + 'cb;

const DEFAULT_WINDOW_SIZE: u32 = 32_768;
const DEFAULT_INPUT_BUFFER_SIZE: usize = 8192;
const DEFAULT_SEEK_BUFFER_SIZE: usize = 8192;

fn validate_window_size(window_size: u32) -> Result<()> {
    if !(512..=32768).contains(&window_size) || !window_size.is_power_of_two() {
        return Err(Error::Params("window_size must be a power of two in 512..=32768"));
    }
    Ok(())
}

/// Builds an [`Index`] bound to a [`ByteStream`] (spec §3 "Index" field
/// list), grounded in `zidx_index_init_advanced`'s parameter set.
pub struct IndexBuilder {
    stream_type: StreamType,
    checksum_mode: ChecksumMode,
    window_size: u32,
    input_buffer_size: usize,
    seek_buffer_size: usize,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self {
            stream_type: StreamType::GzipOrZlib,
            checksum_mode: ChecksumMode::Default,
            window_size: DEFAULT_WINDOW_SIZE,
            input_buffer_size: DEFAULT_INPUT_BUFFER_SIZE,
            seek_buffer_size: DEFAULT_SEEK_BUFFER_SIZE,
        }
    }
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream_type(mut self, stream_type: StreamType) -> Self {
        self.stream_type = stream_type;
        self
    }

    pub fn checksum_mode(mut self, checksum_mode: ChecksumMode) -> Self {
        self.checksum_mode = checksum_mode;
        self
    }

    pub fn window_size(mut self, window_size: u32) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn input_buffer_size(mut self, size: usize) -> Self {
        self.input_buffer_size = size;
        self
    }

    pub fn seek_buffer_size(mut self, size: usize) -> Self {
        self.seek_buffer_size = size;
        self
    }

    /// Builds the [`Index`], borrowing `stream` for its whole lifetime.
    pub fn build(self, stream: &mut dyn ByteStream) -> Result<Index<'_>> {
        validate_window_size(self.window_size)?;
        if self.input_buffer_size == 0 || self.seek_buffer_size == 0 {
            return Err(Error::Params("buffer sizes must be positive"));
        }
        if self.checksum_mode == ChecksumMode::ForceAdler32 {
            return Err(Error::NotImplemented("Adler-32 checksum mode"));
        }

        let header_bits = window_bits_for(self.stream_type, self.window_size);
        let mut tracker = OffsetTracker::new();
        tracker.set_checksum_enabled(self.checksum_mode != ChecksumMode::Disabled);
        Ok(Index {
            stream,
            inflate: InflateDriver::new(header_bits)?,
            tracker,
            checkpoints: CheckpointStore::new(),
            state: StreamState::FileHeaders,
            stream_type: self.stream_type,
            checksum_mode: self.checksum_mode,
            window_size: self.window_size,
            input_buf: vec![0u8; self.input_buffer_size],
            input_pos: 0,
            input_len: 0,
            seek_buf: vec![0u8; self.seek_buffer_size],
            compressed_size: None,
            uncompressed_size: None,
            generation: 0,
        })
    }
}

/// The central state machine: owns the inflate engine, the checkpoint
/// store, the two working buffers, and a borrowed compressed [`ByteStream`]
/// (spec §3 "Index", §4.5).
pub struct Index<'s> {
    stream: &'s mut dyn ByteStream,
    inflate: InflateDriver,
    tracker: OffsetTracker,
    checkpoints: CheckpointStore,
    state: StreamState,
    stream_type: StreamType,
    checksum_mode: ChecksumMode,
    window_size: u32,
    input_buf: Vec<u8>,
    input_pos: usize,
    input_len: usize,
    seek_buf: Vec<u8>,
    compressed_size: Option<u64>,
    uncompressed_size: Option<u64>,
    generation: u64,
}

impl<'s> Index<'s> {
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Bumped every time the index transitions to `Invalid`; carries no
    /// behavior, only distinguishes repeated failures in logs.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn compressed_size(&self) -> Option<u64> {
        self.compressed_size
    }

    pub fn uncompressed_size(&self) -> Option<u64> {
        self.uncompressed_size
    }

    /// Current uncompressed byte position.
    pub fn tell(&self) -> u64 {
        self.tracker.current().uncomp
    }

    /// Resets to the very start of the stream, as if freshly built.
    pub fn rewind(&mut self) -> Result<()> {
        self.stream.seek(0, Whence::Set)?;
        self.state = StreamState::FileHeaders;
        self.tracker.reset();
        self.input_pos = 0;
        self.input_len = 0;
        self.compressed_size = None;
        self.uncompressed_size = None;
        Ok(())
    }

    /// Combines every stored checkpoint's CRC-32 over its run length into a
    /// single whole-stream CRC-32 (spec §4.3, §8 "checksum combine law").
    ///
    /// Only covers uncompressed bytes up to the last stored checkpoint;
    /// a store with a checkpoint at every boundary (as `build_index` with
    /// zero spacing, or a callback that saves unconditionally, produces)
    /// covers the whole stream.
    pub fn whole_stream_checksum(&self) -> u32 {
        let mut acc: Option<u32> = None;
        let mut prev_uncomp = 0u64;
        for ckp in self.checkpoints.iter() {
            let run_len = ckp.offset.uncomp - prev_uncomp;
            acc = Some(match acc {
                None => crate::checksum::combine(0, ckp.checksum, run_len),
                Some(a) => crate::checksum::combine(a, ckp.checksum, run_len),
            });
            prev_uncomp = ckp.offset.uncomp;
        }
        acc.unwrap_or(0)
    }

    fn refill_input(&mut self) -> Result<()> {
        let n = read_fully(self.stream, &mut self.input_buf)?;
        self.input_len = n;
        self.input_pos = 0;
        Ok(())
    }

    fn fire_boundary(
        &mut self,
        callback: &mut Option<&mut BoundaryCallback<'_>>,
        is_last: bool,
    ) -> Result<()> {
        if let Some(cb) = callback.as_deref_mut() {
            let offset = self.tracker.current();
            let mut ctx = BoundaryContext::new(&mut self.checkpoints, &mut self.inflate, &mut self.tracker);
            cb(&mut ctx, offset, is_last)?;
        }
        Ok(())
    }

    /// Consumes any file-format header, selecting the raw-deflate engine
    /// state for the blocks that follow (spec §4.5 *FileHeaders*).
    fn consume_headers(&mut self, callback: &mut Option<&mut BoundaryCallback<'_>>) -> Result<()> {
        let header_bits = window_bits_for(self.stream_type, self.window_size);
        self.inflate.reset(header_bits)?;

        if self.stream_type != StreamType::Deflate {
            let mut sentinel = [0u8; 1];
            loop {
                if self.input_pos == self.input_len {
                    self.refill_input()?;
                    if self.input_pos == self.input_len {
                        return Err(Error::StreamEof);
                    }
                }
                self.inflate.set_input(&self.input_buf[self.input_pos..self.input_len]);
                self.inflate.set_output(&mut sentinel[0..0]);
                let (outcome, report) = self.inflate.inflate_until_block_boundary(Flush::Block)?;
                self.input_pos += report.bytes_consumed as usize;
                self.tracker.advance(
                    report.bytes_consumed,
                    &[],
                    report.on_block_boundary,
                    report.unused_bits,
                    self.inflate.last_consumed_byte(),
                );
                if report.on_block_boundary {
                    break;
                }
                if outcome == StepOutcome::EndOfStream {
                    return Err(Error::Corrupted("stream ended during file headers"));
                }
            }
        }

        let raw_bits = raw_window_bits(self.window_size);
        self.inflate.reset(raw_bits)?;
        self.fire_boundary(callback, false)?;
        self.state = StreamState::DeflateBlocks;
        log::trace!("index: FileHeaders -> DeflateBlocks at comp={}", self.tracker.current().comp);
        Ok(())
    }

    /// Drains the trailer following the last DEFLATE block (spec §4.5
    /// *FileTrailer*).
    ///
    /// Both gzip and zlib drain exactly 8 bytes here. A real zlib trailer is
    /// only 4 bytes (Adler-32); this is a deliberate bug-for-bug match of
    /// the system this crate's behavior is pinned to, not an oversight.
    fn consume_trailer(&mut self) -> Result<()> {
        const TRAILER_LEN: usize = 8;
        let mut drained = 0usize;
        let mut tmp = [0u8; TRAILER_LEN];
        while drained < TRAILER_LEN {
            let buffered = self.input_len - self.input_pos;
            if buffered > 0 {
                let take = buffered.min(TRAILER_LEN - drained);
                self.input_pos += take;
                drained += take;
                continue;
            }
            let need = TRAILER_LEN - drained;
            let n = read_fully(self.stream, &mut tmp[..need])?;
            if n == 0 {
                return Err(Error::StreamEof);
            }
            drained += n;
        }
        self.tracker.advance(drained as u64, &[], false, 0, 0);
        self.state = StreamState::EndOfFile;
        self.compressed_size = Some(self.tracker.current().comp);
        self.uncompressed_size = Some(self.tracker.current().uncomp);
        Ok(())
    }

    /// Reads and decompresses into `buf`, returning the number of bytes
    /// produced (`0` at end of stream). `callback`, when present, is
    /// invoked at every DEFLATE block boundary crossed (spec §4.5).
    pub fn read(&mut self, buf: &mut [u8], mut callback: Option<&mut BoundaryCallback<'_>>) -> Result<usize> {
        match self.state {
            StreamState::Invalid => return Err(Error::Corrupted("index is in an invalid state")),
            StreamState::EndOfFile => return Ok(0),
            StreamState::FileHeaders => {
                if let Err(e) = self.consume_headers(&mut callback) {
                    if e.corrupts_engine() {
                        self.mark_invalid(&e);
                    }
                    return Err(e);
                }
            }
            _ => {}
        }
        match self.read_deflate_blocks(buf, &mut callback) {
            Ok(n) => Ok(n),
            Err(e) => {
                if e.corrupts_engine() {
                    self.mark_invalid(&e);
                }
                Err(e)
            }
        }
    }

    fn mark_invalid(&mut self, cause: &Error) {
        self.state = StreamState::Invalid;
        self.generation += 1;
        log::error!(
            "index: transitioning to Invalid (generation {}): {}",
            self.generation,
            cause
        );
    }

    fn read_deflate_blocks(
        &mut self,
        buf: &mut [u8],
        callback: &mut Option<&mut BoundaryCallback<'_>>,
    ) -> Result<usize> {
        let mut out_pos = 0usize;
        let flush = if callback.is_some() { Flush::Block } else { Flush::SyncFlush };

        while self.state == StreamState::DeflateBlocks && out_pos < buf.len() {
            if self.input_pos == self.input_len {
                self.refill_input()?;
                if self.input_pos == self.input_len {
                    return Err(Error::StreamEof);
                }
            }
            self.inflate.set_input(&self.input_buf[self.input_pos..self.input_len]);
            self.inflate.set_output(&mut buf[out_pos..]);
            let (outcome, report) = self.inflate.inflate_until_block_boundary(flush)?;

            let produced = report.bytes_produced as usize;
            self.input_pos += report.bytes_consumed as usize;
            self.tracker.advance(
                report.bytes_consumed,
                &buf[out_pos..out_pos + produced],
                report.on_block_boundary,
                report.unused_bits,
                self.inflate.last_consumed_byte(),
            );
            out_pos += produced;

            if report.on_block_boundary {
                if report.is_last_block {
                    self.state = match self.stream_type {
                        StreamType::Deflate => StreamState::EndOfFile,
                        StreamType::Gzip | StreamType::GzipOrZlib => StreamState::FileTrailer,
                    };
                    if self.state == StreamState::EndOfFile {
                        self.compressed_size = Some(self.tracker.current().comp);
                        self.uncompressed_size = Some(self.tracker.current().uncomp);
                    }
                }
                self.fire_boundary(callback, report.is_last_block)?;
            }

            if self.state == StreamState::FileTrailer {
                self.consume_trailer()?;
                break;
            }
            if outcome == StepOutcome::EndOfStream {
                break;
            }
        }
        Ok(out_pos)
    }

    /// Repositions to uncompressed offset `target`, jumping to the best
    /// available checkpoint and decoding-and-discarding the remainder
    /// (spec §4.5 *seek*).
    pub fn seek(&mut self, target: u64, mut callback: Option<&mut BoundaryCallback<'_>>) -> Result<()> {
        if self.state == StreamState::Invalid {
            return Err(Error::Corrupted("index is in an invalid state"));
        }

        match self.checkpoints.lower_bound_by_uncomp(target as i64) {
            Err(Error::NotFound) => {
                self.stream.seek(0, Whence::Set)?;
                self.state = StreamState::FileHeaders;
                self.tracker.reset();
                self.input_pos = 0;
                self.input_len = 0;
            }
            Err(e) => return Err(e),
            Ok(idx) => {
                let ckp = self
                    .checkpoints
                    .get(idx)
                    .ok_or(Error::Corrupted("lower_bound_by_uncomp returned an out-of-range index"))?
                    .clone();
                let current = self.tracker.current();
                let checkpoint_is_better = current.uncomp < ckp.offset.uncomp || current.uncomp > target;
                if checkpoint_is_better {
                    let raw_bits = raw_window_bits(self.window_size);
                    self.inflate.reset(raw_bits)?;
                    self.stream.seek(
                        i64::try_from(ckp.offset.comp).map_err(|_| Error::Overflow)?,
                        Whence::Set,
                    )?;
                    if ckp.offset.bits_count > 0 {
                        let b = ckp.offset.byte >> (8 - ckp.offset.bits_count);
                        self.inflate.prime_bits(ckp.offset.bits_count, b as u32)?;
                    }
                    self.inflate.set_dictionary(ckp.window())?;
                    self.state = StreamState::DeflateBlocks;
                    self.tracker.set_current(ckp.offset);
                    self.tracker.take_checksum();
                    self.input_pos = 0;
                    self.input_len = 0;
                }
            }
        }

        let mut remaining = target
            .checked_sub(self.tracker.current().uncomp)
            .ok_or(Error::InvalidOp("seek landed past its own target"))?;

        let mut discard = std::mem::take(&mut self.seek_buf);
        let mut result = Ok(());
        while remaining > 0 {
            let chunk = remaining.min(discard.len() as u64) as usize;
            match self.read(&mut discard[..chunk], callback.as_deref_mut()) {
                Ok(0) => {
                    result = Err(Error::StreamEof);
                    break;
                }
                Ok(n) => remaining -= n as u64,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.seek_buf = discard;
        result
    }

    /// Drives `read` to completion, inserting a checkpoint whenever the
    /// configured `spacing` (measured in `space`) has been exceeded since
    /// the last one (spec §4.5 *build_index*).
    pub fn build_index(&mut self, spacing: u64, space: SpacingSpace) -> Result<()> {
        let mut last_saved: u64 = 0;
        let mut cb = move |ctx: &mut BoundaryContext<'_>, offset: Offset, _is_last: bool| -> Result<()> {
            let current_offset = match space {
                SpacingSpace::Uncompressed => offset.uncomp,
                SpacingSpace::Compressed => offset.comp,
            };
            if current_offset >= last_saved + spacing {
                ctx.capture_checkpoint(offset)?;
                last_saved = current_offset;
            }
            Ok(())
        };

        let mut buf = vec![0u8; self.input_buf.len()];
        while self.state != StreamState::EndOfFile {
            self.read(&mut buf, Some(&mut cb))?;
        }
        Ok(())
    }

    /// Exports the current checkpoint set and discovered sizes (spec §4.6,
    /// §6.3), applying `filter` (if any) to decide which checkpoints to keep.
    pub fn export(
        &self,
        out: &mut dyn ByteStream,
        filter: Option<&mut crate::format::ExportFilter<'_>>,
    ) -> Result<()> {
        let file_type = match self.stream_type {
            StreamType::Gzip | StreamType::GzipOrZlib => 1,
            StreamType::Deflate => 0,
        };
        let info = crate::format::ExportInfo {
            checkpoints: &self.checkpoints,
            whole_stream_checksum: self.whole_stream_checksum(),
            file_type,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
        };
        crate::format::export(out, &info, filter)
    }

    /// Imports a persisted checkpoint set into a shadow store and only then
    /// transplants it, so a failed import leaves `self` untouched (spec
    /// §4.6 "shadow index").
    pub fn import(
        &mut self,
        input: &mut dyn ByteStream,
        filter: Option<&mut crate::format::ImportFilter<'_>>,
    ) -> Result<()> {
        let (shadow, header) = crate::format::import(input, filter)?;
        self.checkpoints = shadow;
        if let Some(compressed_size) = header.compressed_size {
            self.compressed_size = Some(compressed_size);
        }
        if let Some(uncompressed_size) = header.uncompressed_size {
            self.uncompressed_size = Some(uncompressed_size);
        }
        Ok(())
    }
}
