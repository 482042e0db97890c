//! Random access into a gzip/zlib/DEFLATE byte stream.
//!
//! DEFLATE is inherently sequential: decoding the byte at uncompressed
//! offset `U` normally requires replaying every byte before it. This crate
//! builds an auxiliary *access index* of *checkpoints* at selected DEFLATE
//! block boundaries, each capturing a 32 KiB history window, the compressed
//! bit position, and the handful of leftover bits of the straddling byte —
//! just enough to resume decompression at that boundary without touching
//! earlier bytes.
//!
//! The [`Index`] is the entry point: bind it to a [`ByteStream`] over the
//! compressed data, then `read` sequentially (optionally building
//! checkpoints as you go via [`Index::build_index`]), `seek` to an
//! uncompressed offset, or persist the checkpoint set with
//! [`Index::export`]/[`Index::import`].
//!
//! Out of scope: the raw inflate engine (an internal collaborator bound to
//! system zlib), a full async/concurrent decoder, multi-member gzip
//! concatenation, and any integrity guarantee beyond the block-level
//! running CRC-32 ledger.

pub mod checkpoint;
pub mod checksum;
pub mod error;
pub mod facade;
pub mod format;
pub mod index;
mod inflate;
pub mod offset;
pub mod stream;

pub use checkpoint::{Checkpoint, CheckpointStore, MAX_WINDOW_LEN};
pub use error::{Error, Result};
pub use facade::{CheckpointHandle, Facade};
pub use format::{ExportFilter, ImportFilter};
pub use index::{
    BoundaryCallback, BoundaryContext, ChecksumMode, Index, IndexBuilder, SpacingSpace,
    StreamState, StreamType,
};
pub use offset::Offset;
pub use stream::{ByteStream, FileByteStream, SliceByteStream, VecByteStream, Whence};
