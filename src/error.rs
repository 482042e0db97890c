//! Error taxonomy shared by every public operation in this crate.
//!
//! Every fallible operation returns [`Result<T>`]; there is no panicking
//! control flow across a public function boundary and no hidden retry.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The distinct, surfaceable failure modes of the index.
///
/// Errors that leave the underlying inflate engine in an undefined state
/// (anything that would transition an [`crate::Index`] to
/// `StreamState::Invalid`) are reported as [`Error::Corrupted`]; the index
/// is then inert except for being dropped and recreated.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A null, out-of-range, or otherwise inconsistent argument was passed.
    #[error("invalid parameter: {0}")]
    Params(&'static str),

    /// Allocation failed.
    #[error("allocation failed")]
    Memory,

    /// An invariant check failed, the index reached an undefined state, or
    /// a persisted index file failed a format check.
    #[error("corrupted index or stream state: {0}")]
    Corrupted(&'static str),

    /// The bound [`crate::ByteStream`] reported a read failure or premature EOF.
    #[error("stream read error")]
    StreamRead,

    /// The bound [`crate::ByteStream`] reported a write failure.
    #[error("stream write error")]
    StreamWrite,

    /// The bound [`crate::ByteStream`] reported a seek failure.
    #[error("stream seek error")]
    StreamSeek,

    /// The bound [`crate::ByteStream`] ended before the requested bytes were read.
    #[error("unexpected end of stream")]
    StreamEof,

    /// The operation is meaningful in principle but not in the current state.
    #[error("invalid operation: {0}")]
    InvalidOp(&'static str),

    /// A lookup found nothing (e.g. [`crate::CheckpointStore::lower_bound_by_uncomp`]).
    #[error("not found")]
    NotFound,

    /// A persisted integer does not fit the receiving type.
    #[error("integer overflow while decoding persisted value")]
    Overflow,

    /// A documented feature is not present in this build.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Pass-through of the underlying inflate engine's error code.
    #[error("inflate engine error ({0})")]
    Zlib(i32),

    /// Pass-through of a user-supplied boundary callback's error code.
    #[error("callback error ({0})")]
    Callback(i32),
}

impl Error {
    /// True if this error leaves the inflate engine in an undefined state,
    /// meaning the owning [`crate::Index`] must transition to `Invalid`.
    pub(crate) fn corrupts_engine(&self) -> bool {
        matches!(self, Error::Zlib(_) | Error::Corrupted(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(_: std::io::Error) -> Self {
        Error::StreamRead
    }
}

/// Converts a foreign boundary-callback status code (zero is success,
/// nonzero aborts the caller) into a [`Result`].
///
/// Native Rust callbacks in this crate return [`Result<()>`] directly and
/// never need this conversion; it exists for adapters around legacy
/// integer-returning callbacks.
pub fn callback_status(code: i32) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(Error::Callback(code))
    }
}
