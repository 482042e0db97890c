//! The inflate engine collaborator (spec §4.2 / §6.1), bound to system zlib
//! through raw FFI.
//!
//! The checkpoint/resume protocol needs zlib capabilities the safe `flate2`
//! wrapper doesn't expose: `Z_BLOCK` flush, the `data_type` boundary
//! encoding, `inflateGetDictionary`, `inflateSetDictionary`, `inflatePrime`,
//! and `inflateReset2`. The binding style here follows `flate2`'s own
//! `src/ffi.rs`/`src/stream.rs` (kept under `examples/other_examples/` for
//! reference) and, more directly, the gzip checkpointing decompressor in
//! `examples/other_examples/78769ce9_replit-ztoc-rs__src-zinfo.rs.rs`, which
//! drives `inflate()` with `Z_BLOCK` and decodes `data_type` the same way.

use std::mem;
use std::os::raw::{c_int, c_uint};

use libz_sys as zlib;

use crate::error::{Error, Result};

/// Flush modes relevant to boundary-aware inflation (spec §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Stop at the next deflate block boundary, possibly mid-byte.
    Block,
    /// Flush pending output, byte-aligned; no boundary guarantee.
    SyncFlush,
}

impl Flush {
    fn as_raw(self) -> c_int {
        match self {
            Flush::Block => zlib::Z_BLOCK,
            Flush::SyncFlush => zlib::Z_SYNC_FLUSH,
        }
    }
}

/// Outcome of a call to [`InflateDriver::inflate_until_block_boundary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Ok,
    EndOfStream,
}

/// Observable state after a step (spec §4.2's boundary-report half of the
/// five-capability contract).
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundaryReport {
    pub on_block_boundary: bool,
    pub is_last_block: bool,
    pub unused_bits: u8,
    pub bytes_consumed: u64,
    pub bytes_produced: u64,
}

/// Window-bits selection derived from `StreamType` (spec §4.2).
pub fn window_bits_for(stream_type: crate::index::StreamType, window_size: u32) -> c_int {
    let bits = window_size.trailing_zeros() as c_int;
    match stream_type {
        crate::index::StreamType::Deflate => -bits,
        crate::index::StreamType::Gzip => 16 + bits,
        crate::index::StreamType::GzipOrZlib => 32 + bits,
    }
}

/// Raw-deflate window bits used once past the header (spec §4.5 FileHeaders).
pub fn raw_window_bits(window_size: u32) -> c_int {
    -(window_size.trailing_zeros() as c_int)
}

/// Owns a raw `z_stream` and exposes the boundary-aware driver surface.
pub struct InflateDriver {
    stream: Box<zlib::z_stream>,
    last_consumed_byte: u8,
    ended: bool,
}

impl InflateDriver {
    pub fn new(window_bits: c_int) -> Result<Self> {
        let mut stream: Box<zlib::z_stream> = Box::new(unsafe { mem::zeroed() });
        let ret = unsafe {
            zlib::inflateInit2_(
                stream.as_mut() as *mut zlib::z_stream,
                window_bits,
                zlib::zlibVersion(),
                mem::size_of::<zlib::z_stream>() as c_int,
            )
        };
        if ret != zlib::Z_OK {
            return Err(Error::Zlib(ret));
        }
        Ok(Self {
            stream,
            last_consumed_byte: 0,
            ended: false,
        })
    }

    /// Reinitializes the engine with new window bits (spec §4.5: header
    /// done -> raw deflate; §4.5 seek: jump -> raw deflate again).
    pub fn reset(&mut self, window_bits: c_int) -> Result<()> {
        let ret = unsafe {
            zlib::inflateReset2(self.stream.as_mut() as *mut zlib::z_stream, window_bits)
        };
        if ret != zlib::Z_OK {
            return Err(Error::Zlib(ret));
        }
        Ok(())
    }

    /// Points the engine's input cursor at `buf` without copying.
    ///
    /// # Safety invariant
    /// `buf` must outlive the next call into this driver.
    pub fn set_input(&mut self, buf: &[u8]) {
        self.stream.next_in = buf.as_ptr() as *mut u8;
        self.stream.avail_in = buf.len() as c_uint;
    }

    /// Points the engine's output cursor at `buf` without copying.
    pub fn set_output(&mut self, buf: &mut [u8]) {
        self.stream.next_out = buf.as_mut_ptr();
        self.stream.avail_out = buf.len() as c_uint;
    }

    pub fn avail_in(&self) -> u32 {
        self.stream.avail_in
    }

    pub fn avail_out(&self) -> u32 {
        self.stream.avail_out
    }

    /// Advances inflation until the next block boundary (or output/input is
    /// exhausted, or the stream ends), per spec §4.2/§6.1.
    ///
    /// The straddle byte at a boundary is fetched from `next_in - 1`, the
    /// same place the original C implementation reads it from; here that is
    /// a bounded pointer read one past the engine's own input cursor,
    /// guarded by `bytes_consumed > 0` (the underflow guard of spec §4.3).
    pub fn inflate_until_block_boundary(
        &mut self,
        flush: Flush,
    ) -> Result<(StepOutcome, BoundaryReport)> {
        let avail_in_before = self.stream.avail_in;
        let avail_out_before = self.stream.avail_out;

        let ret =
            unsafe { zlib::inflate(self.stream.as_mut() as *mut zlib::z_stream, flush.as_raw()) };

        let bytes_consumed = (avail_in_before - self.stream.avail_in) as u64;
        let bytes_produced = (avail_out_before - self.stream.avail_out) as u64;

        let data_type = self.stream.data_type;
        let on_boundary = (data_type & 128) != 0;
        let is_last_block = (data_type & 64) != 0;
        let unused_bits = if on_boundary { (data_type & 7) as u8 } else { 0 };

        if bytes_consumed > 0 {
            // SAFETY: at least one byte was consumed, so next_in - 1 still
            // lands inside the caller-owned input slice set via set_input.
            self.last_consumed_byte = unsafe { *self.stream.next_in.offset(-1) };
        }

        let report = BoundaryReport {
            on_block_boundary: on_boundary,
            is_last_block,
            unused_bits,
            bytes_consumed,
            bytes_produced,
        };

        match ret {
            zlib::Z_OK | zlib::Z_BUF_ERROR => Ok((StepOutcome::Ok, report)),
            zlib::Z_STREAM_END => Ok((StepOutcome::EndOfStream, report)),
            other => Err(Error::Zlib(other)),
        }
    }

    /// The compressed byte most recently consumed, valid only right after a
    /// boundary report with `unused_bits > 0`.
    pub fn last_consumed_byte(&self) -> u8 {
        self.last_consumed_byte
    }

    /// Copies the current up-to-window-size sliding history into `out`,
    /// returning the number of bytes written.
    pub fn dictionary_copy(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut len: c_uint = 0;
        let ret = unsafe {
            zlib::inflateGetDictionary(
                self.stream.as_mut() as *mut zlib::z_stream,
                out.as_mut_ptr(),
                &mut len,
            )
        };
        if ret != zlib::Z_OK {
            return Err(Error::Zlib(ret));
        }
        Ok(len as usize)
    }

    /// Primes the engine with a preset dictionary (history window) ahead of
    /// resuming decompression from a checkpoint.
    pub fn set_dictionary(&mut self, dict: &[u8]) -> Result<()> {
        let ret = unsafe {
            zlib::inflateSetDictionary(
                self.stream.as_mut() as *mut zlib::z_stream,
                dict.as_ptr(),
                dict.len() as c_uint,
            )
        };
        if ret != zlib::Z_OK {
            return Err(Error::Zlib(ret));
        }
        Ok(())
    }

    /// Inserts `count` bits of `value` ahead of the next inflate call, used
    /// to prime the straddle bits of a checkpoint before resuming.
    pub fn prime_bits(&mut self, count: u8, value: u32) -> Result<()> {
        let ret = unsafe {
            zlib::inflatePrime(
                self.stream.as_mut() as *mut zlib::z_stream,
                count as c_int,
                value as c_int,
            )
        };
        if ret != zlib::Z_OK {
            return Err(Error::Zlib(ret));
        }
        Ok(())
    }

    /// Tears the engine down early. Also done implicitly on `Drop`.
    pub fn end(&mut self) {
        if !self.ended {
            unsafe {
                zlib::inflateEnd(self.stream.as_mut() as *mut zlib::z_stream);
            }
            self.ended = true;
        }
    }
}

impl Drop for InflateDriver {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::StreamType;

    fn deflate_raw(data: &[u8]) -> Vec<u8> {
        use std::io::Write;
        let mut enc =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn window_bits_selection() {
        assert_eq!(window_bits_for(StreamType::Deflate, 32768), -15);
        assert_eq!(window_bits_for(StreamType::Gzip, 32768), 16 + 15);
        assert_eq!(window_bits_for(StreamType::GzipOrZlib, 32768), 32 + 15);
    }

    #[test]
    fn inflate_raw_deflate_roundtrip() {
        let original = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let compressed = deflate_raw(&original);

        let mut driver = InflateDriver::new(raw_window_bits(32768)).unwrap();
        let mut out = vec![0u8; original.len() + 16];
        driver.set_input(&compressed);
        driver.set_output(&mut out);
        let mut total_out = 0u64;
        loop {
            let (outcome, report) = driver
                .inflate_until_block_boundary(Flush::SyncFlush)
                .unwrap();
            total_out += report.bytes_produced;
            if outcome == StepOutcome::EndOfStream {
                break;
            }
            if driver.avail_out() == 0 {
                break;
            }
        }
        assert_eq!(total_out as usize, original.len());
        assert_eq!(&out[..original.len()], &original[..]);
    }
}
