//! `Offset` value and the `OffsetTracker` that maintains it during inflate.

use std::fmt;

/// A position that can be resumed from: a pair of byte offsets plus the
/// leftover bits of the straddling byte at a DEFLATE block boundary.
///
/// Meaningful only at a block boundary; between boundaries `bits_count` is
/// `0` and `byte` is `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Offset {
    /// Byte offset into the decompressed stream.
    pub uncomp: u64,
    /// Byte offset into the compressed stream.
    pub comp: u64,
    /// Number of high-order bits of `byte` belonging to the next block, `0..=7`.
    pub bits_count: u8,
    /// The straddling compressed byte, or `0` when `bits_count == 0`.
    pub byte: u8,
}

impl Offset {
    /// Checks the struct invariant: `bits_count == 0 ⇒ byte == 0`.
    pub fn is_valid(&self) -> bool {
        self.bits_count <= 7 && (self.bits_count != 0 || self.byte == 0)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uncomp={} comp={} bits={} byte={:#04x}",
            self.uncomp, self.comp, self.bits_count, self.byte
        )
    }
}

/// Tracks the current `(comp, uncomp)` position and straddle state while
/// inflating, and folds produced bytes into a running CRC-32.
#[derive(Debug, Default)]
pub struct OffsetTracker {
    current: Offset,
    checksum: crate::checksum::RunningChecksum,
    checksum_enabled: bool,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self {
            checksum_enabled: true,
            ..Self::default()
        }
    }

    /// Gates whether produced bytes are folded into the running checksum
    /// (spec §3 `ChecksumMode::Disabled`: checkpoints carry `0`).
    pub fn set_checksum_enabled(&mut self, enabled: bool) {
        self.checksum_enabled = enabled;
    }

    pub fn current(&self) -> Offset {
        self.current
    }

    pub fn set_current(&mut self, offset: Offset) {
        self.current = offset;
    }

    /// Advances `comp`/`uncomp` after an inflate step, folding `produced`
    /// into the running checksum, and recording block-boundary straddle
    /// state when applicable.
    ///
    /// `last_consumed_byte` is the most recently consumed compressed byte;
    /// it is only read when `on_boundary && unused_bits > 0`, so a caller
    /// that consumed zero bytes this step need not supply anything
    /// meaningful (the underflow guard: straddle state is left untouched
    /// when nothing was consumed).
    pub fn advance(
        &mut self,
        bytes_consumed: u64,
        bytes_produced: &[u8],
        on_boundary: bool,
        unused_bits: u8,
        last_consumed_byte: u8,
    ) {
        self.current.comp += bytes_consumed;
        self.current.uncomp += bytes_produced.len() as u64;
        if self.checksum_enabled {
            self.checksum.update(bytes_produced);
        }

        if on_boundary {
            self.current.bits_count = unused_bits;
            if unused_bits > 0 {
                // Underflow guard: if nothing was consumed this step, the
                // straddle byte is still whatever it was before — there is
                // no new compressed byte to attribute it to.
                if bytes_consumed > 0 {
                    self.current.byte = last_consumed_byte;
                }
            } else {
                self.current.byte = 0;
            }
        } else {
            self.current.bits_count = 0;
            self.current.byte = 0;
        }
    }

    /// The checksum accumulated since the last [`OffsetTracker::take_checksum`].
    pub fn checksum_value(&self) -> u32 {
        self.checksum.value()
    }

    pub fn checksum_len(&self) -> u64 {
        self.checksum.len()
    }

    /// Returns and resets the running checksum, as done on checkpoint emission.
    pub fn take_checksum(&mut self) -> (u32, u64) {
        let value = self.checksum.value();
        let len = self.checksum.len();
        self.checksum.reset();
        (value, len)
    }

    /// Resets position and checksum to the start of the stream.
    pub fn reset(&mut self) {
        self.current = Offset::default();
        self.checksum.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_invariant() {
        assert!(Offset {
            uncomp: 0,
            comp: 0,
            bits_count: 0,
            byte: 0
        }
        .is_valid());
        assert!(!Offset {
            uncomp: 0,
            comp: 0,
            bits_count: 0,
            byte: 5
        }
        .is_valid());
        assert!(Offset {
            uncomp: 0,
            comp: 0,
            bits_count: 3,
            byte: 5
        }
        .is_valid());
    }

    #[test]
    fn advance_records_straddle_only_on_boundary() {
        let mut t = OffsetTracker::new();
        t.advance(10, b"hello", false, 0, 0);
        assert_eq!(t.current().bits_count, 0);
        t.advance(3, b"world", true, 5, 0xAB);
        let cur = t.current();
        assert_eq!(cur.bits_count, 5);
        assert_eq!(cur.byte, 0xAB);
        assert_eq!(cur.uncomp, 10);
        assert_eq!(cur.comp, 13);
    }

    #[test]
    fn advance_clears_straddle_when_zero_unused_bits() {
        let mut t = OffsetTracker::new();
        t.advance(1, b"x", true, 0, 0xFF);
        assert_eq!(t.current().bits_count, 0);
        assert_eq!(t.current().byte, 0);
    }

    #[test]
    fn underflow_guard_leaves_byte_untouched_when_nothing_consumed() {
        let mut t = OffsetTracker::new();
        t.advance(1, b"x", true, 5, 0xAB);
        assert_eq!(t.current().byte, 0xAB);
        // Another boundary call that consumed nothing must not clobber byte
        // with uninitialized/default data; here we simulate by passing the
        // same last byte back in, since a real caller simply won't change
        // the compressed cursor either.
        t.advance(0, b"", true, 5, 0);
        assert_eq!(t.current().byte, 0xAB);
        assert_eq!(t.current().bits_count, 5);
    }

    #[test]
    fn checksum_tracks_and_resets() {
        let mut t = OffsetTracker::new();
        t.advance(0, b"abc", false, 0, 0);
        t.advance(0, b"def", false, 0, 0);
        let (v, len) = t.take_checksum();
        assert_eq!(len, 6);
        let mut h = crc32fast::Hasher::new();
        h.update(b"abcdef");
        assert_eq!(v, h.finalize());
        assert_eq!(t.checksum_len(), 0);
    }
}
