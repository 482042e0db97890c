//! `Checkpoint` value and the ordered, index-addressable `CheckpointStore`.

use crate::error::{Error, Result};
use crate::offset::Offset;

/// Maximum history window a checkpoint may carry.
pub const MAX_WINDOW_LEN: usize = 32_768;

/// A captured resume point: an [`Offset`], up to 32 KiB of preceding
/// uncompressed history, and the CRC-32 of the bytes produced since the
/// previous checkpoint.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub offset: Offset,
    window: Vec<u8>,
    pub checksum: u32,
}

impl Checkpoint {
    /// Builds a checkpoint, rejecting an oversized window up front so the
    /// `window_length ≤ 32768` invariant can never be violated by a stored
    /// checkpoint.
    pub fn new(offset: Offset, window: Vec<u8>, checksum: u32) -> Result<Self> {
        if window.len() > MAX_WINDOW_LEN {
            return Err(Error::Params("checkpoint window exceeds 32768 bytes"));
        }
        Ok(Self {
            offset,
            window,
            checksum,
        })
    }

    pub fn window(&self) -> &[u8] {
        &self.window
    }

    pub fn window_len(&self) -> u16 {
        self.window.len() as u16
    }
}

/// Dense, append-ordered sequence of [`Checkpoint`]s with strictly
/// increasing uncompressed offsets and O(log n) lookup.
#[derive(Debug, Default)]
pub struct CheckpointStore {
    items: Vec<Checkpoint>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn get(&self, idx: usize) -> Option<&Checkpoint> {
        self.items.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Checkpoint> {
        self.items.iter()
    }

    pub fn last(&self) -> Option<&Checkpoint> {
        self.items.last()
    }

    /// Appends `ckp` if its uncompressed offset is strictly greater than the
    /// last stored one; grows geometrically (capacity doubles, +1 at zero)
    /// on overflow.
    pub fn add(&mut self, ckp: Checkpoint) -> Result<()> {
        if let Some(last) = self.items.last() {
            if ckp.offset.uncomp <= last.offset.uncomp {
                return Err(Error::InvalidOp(
                    "checkpoint offsets must be strictly increasing",
                ));
            }
        }
        if self.items.len() == self.items.capacity() {
            let new_cap = self.items.capacity() * 2 + 1;
            self.items.reserve(new_cap - self.items.capacity());
        }
        self.items.push(ckp);
        Ok(())
    }

    /// Returns the index of the last checkpoint whose uncompressed offset is
    /// `≤ target`, or [`Error::NotFound`] when the store is empty or
    /// `target` precedes the first checkpoint.
    ///
    /// Closed-interval binary search with a fast-path check against the
    /// last element first, since sequential-append-then-seek-near-the-end
    /// is the common case this crate is built for.
    pub fn lower_bound_by_uncomp(&self, target: i64) -> Result<usize> {
        if target < 0 {
            return Err(Error::Params("target offset must be non-negative"));
        }
        let target = target as u64;
        if self.items.is_empty() || target < self.items[0].offset.uncomp {
            return Err(Error::NotFound);
        }

        let last_idx = self.items.len() - 1;
        if target >= self.items[last_idx].offset.uncomp {
            return Ok(last_idx);
        }

        let (mut lo, mut hi) = (0usize, last_idx);
        while lo < hi {
            // round up to keep the search making progress toward hi when lo+1==hi
            let mid = lo + (hi - lo + 1) / 2;
            if self.items[mid].offset.uncomp <= target {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        Ok(lo)
    }

    /// Reserves capacity for `n` additional checkpoints.
    pub fn extend(&mut self, n: usize) {
        self.items.reserve(n);
    }

    /// Drops capacity down toward `count()`, keeping at least `n` spare slots.
    pub fn shrink(&mut self, n: usize) {
        let target = self.items.len() + n;
        if target < self.items.capacity() {
            self.items.shrink_to(target);
        }
    }

    /// Shrinks capacity to exactly fit the current contents.
    pub fn fit(&mut self) {
        self.items.shrink_to_fit();
    }

    /// Replaces the contents wholesale, used by import's shadow-index commit.
    pub(crate) fn replace_all(&mut self, items: Vec<Checkpoint>) {
        self.items = items;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ckp(uncomp: u64, comp: u64) -> Checkpoint {
        Checkpoint::new(
            Offset {
                uncomp,
                comp,
                bits_count: 0,
                byte: 0,
            },
            vec![],
            0,
        )
        .unwrap()
    }

    #[test]
    fn rejects_oversized_window() {
        let big = vec![0u8; MAX_WINDOW_LEN + 1];
        assert!(Checkpoint::new(Offset::default(), big, 0).is_err());
    }

    #[test]
    fn add_enforces_strictly_increasing_offsets() {
        let mut store = CheckpointStore::new();
        store.add(ckp(10, 5)).unwrap();
        store.add(ckp(20, 9)).unwrap();
        assert!(store.add(ckp(20, 12)).is_err());
        assert!(store.add(ckp(15, 12)).is_err());
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn lower_bound_empty_store_is_not_found() {
        let store = CheckpointStore::new();
        assert!(matches!(
            store.lower_bound_by_uncomp(5),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn lower_bound_before_first_is_not_found() {
        let mut store = CheckpointStore::new();
        store.add(ckp(100, 10)).unwrap();
        assert!(matches!(
            store.lower_bound_by_uncomp(50),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn lower_bound_exact_and_between() {
        let mut store = CheckpointStore::new();
        for i in 0..10u64 {
            store.add(ckp(i * 100, i * 10)).unwrap();
        }
        assert_eq!(store.lower_bound_by_uncomp(0).unwrap(), 0);
        assert_eq!(store.lower_bound_by_uncomp(150).unwrap(), 1);
        assert_eq!(store.lower_bound_by_uncomp(900).unwrap(), 9);
        assert_eq!(store.lower_bound_by_uncomp(10_000).unwrap(), 9);
        assert_eq!(store.lower_bound_by_uncomp(899).unwrap(), 8);
    }

    #[test]
    fn lower_bound_rejects_negative_target() {
        let mut store = CheckpointStore::new();
        store.add(ckp(1, 1)).unwrap();
        assert!(matches!(
            store.lower_bound_by_uncomp(-1),
            Err(Error::Params(_))
        ));
    }

    #[test]
    fn lower_bound_property_matches_adjacent_scan() {
        let mut store = CheckpointStore::new();
        let offsets = [3u64, 17, 42, 100, 101, 5000];
        for (i, &u) in offsets.iter().enumerate() {
            store.add(ckp(u, i as u64)).unwrap();
        }
        for target in 0..6000i64 {
            let result = store.lower_bound_by_uncomp(target);
            if (target as u64) < offsets[0] {
                assert!(matches!(result, Err(Error::NotFound)));
            } else {
                let i = result.unwrap();
                assert!(store.get(i).unwrap().offset.uncomp <= target as u64);
                if i + 1 < store.count() {
                    assert!(store.get(i + 1).unwrap().offset.uncomp > target as u64);
                }
            }
        }
    }
}
