//! Running checksum ledger for checkpointed CRC-32 accounting.
//!
//! Per-chunk CRC-32 accumulation is delegated to `crc32fast`, which picks a
//! SIMD-accelerated implementation where available. The *combine* operation
//! — folding two adjacent checkpoints' CRC-32s (and the byte length of the
//! second run) into the CRC-32 of their concatenation — is implemented here
//! directly, following the classic GF(2) polynomial-matrix-squaring
//! construction zlib's own `crc32_combine()` uses.

const GF2_DIM: usize = 32;
const CRC32_POLY: u32 = 0xEDB8_8320;

/// An accumulator for the CRC-32 over uncompressed bytes produced since the
/// last checkpoint emission.
#[derive(Debug, Default)]
pub struct RunningChecksum {
    hasher: crc32fast::Hasher,
    len: u64,
}

impl RunningChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a chunk of newly produced uncompressed bytes into the running
    /// checksum.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.len += chunk.len() as u64;
    }

    /// Returns the checksum of everything folded in so far.
    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Number of bytes folded in so far, i.e. the checkpoint's run length.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Resets to the initial state, as done at each checkpoint emission.
    pub fn reset(&mut self) {
        self.hasher = crc32fast::Hasher::new();
        self.len = 0;
    }
}

fn gf2_matrix_times(mat: &[u32; GF2_DIM], mut vec: u32) -> u32 {
    let mut sum = 0u32;
    let mut i = 0;
    while vec != 0 {
        if vec & 1 != 0 {
            sum ^= mat[i];
        }
        vec >>= 1;
        i += 1;
    }
    sum
}

fn gf2_matrix_square(square: &mut [u32; GF2_DIM], mat: &[u32; GF2_DIM]) {
    for n in 0..GF2_DIM {
        square[n] = gf2_matrix_times(mat, mat[n]);
    }
}

/// Combines `crc1` (the CRC-32 of a prefix) with `crc2` (the CRC-32 of the
/// bytes immediately following that prefix, of length `len2`) into the
/// CRC-32 of the whole concatenation.
///
/// This is the textbook bit-matrix approach zlib's own `crc32_combine()`
/// uses: build the 32x32 GF(2) matrix that advances a CRC register by one
/// zero bit, repeatedly square it to advance by `len2` zero *bits* (walking
/// `len2`'s binary representation, squaring the matrix each step the way
/// exponentiation-by-squaring does), and apply the result to `crc1` before
/// xoring in `crc2`.
pub fn combine(crc1: u32, crc2: u32, len2: u64) -> u32 {
    if len2 == 0 {
        return crc1;
    }

    // odd[n] = matrix advancing the CRC register by one zero bit.
    let mut odd = [0u32; GF2_DIM];
    odd[0] = CRC32_POLY;
    let mut row = 1u32;
    for n in 1..GF2_DIM {
        odd[n] = row;
        row <<= 1;
    }

    // even = odd^2 (two zero bits); odd = even^2 (four zero bits). The loop
    // below keeps squaring whichever of the two currently holds the
    // "2^k zero bits" operator, so by its first iteration `even` holds the
    // operator for eight zero bits — one zero byte — and each subsequent
    // iteration doubles the byte step, consuming `len2` one bit at a time.
    let mut even = [0u32; GF2_DIM];
    gf2_matrix_square(&mut even, &odd);
    gf2_matrix_square(&mut odd, &even);

    let mut crc1 = crc1;
    let mut len2 = len2;

    loop {
        gf2_matrix_square(&mut even, &odd);
        if len2 & 1 != 0 {
            crc1 = gf2_matrix_times(&even, crc1);
        }
        len2 >>= 1;
        if len2 == 0 {
            break;
        }

        gf2_matrix_square(&mut odd, &even);
        if len2 & 1 != 0 {
            crc1 = gf2_matrix_times(&odd, crc1);
        }
        len2 >>= 1;
        if len2 == 0 {
            break;
        }
    }

    crc1 ^ crc2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crc32(data: &[u8]) -> u32 {
        let mut h = crc32fast::Hasher::new();
        h.update(data);
        h.finalize()
    }

    #[test]
    fn combine_matches_direct_crc_of_concatenation() {
        let a: Vec<u8> = (0..137u32).map(|x| x as u8).collect();
        let b: Vec<u8> = (0..91u32).map(|x| (x * 7) as u8).collect();
        let mut whole = a.clone();
        whole.extend_from_slice(&b);

        let combined = combine(crc32(&a), crc32(&b), b.len() as u64);
        assert_eq!(combined, crc32(&whole));
    }

    #[test]
    fn combine_with_empty_second_run_is_identity() {
        let a = b"some prefix bytes";
        assert_eq!(combine(crc32(a), crc32(b""), 0), crc32(a));
    }

    #[test]
    fn combine_over_many_checkpoint_sized_runs() {
        let chunks: Vec<Vec<u8>> = (0..17u32)
            .map(|i| (0..(1000 + i * 13)).map(|b| (b ^ i) as u8).collect())
            .collect();
        let mut acc_crc = 0u32;
        let mut whole = Vec::new();
        for (i, c) in chunks.iter().enumerate() {
            let c_crc = crc32(c);
            acc_crc = if i == 0 {
                c_crc
            } else {
                combine(acc_crc, c_crc, c.len() as u64)
            };
            whole.extend_from_slice(c);
        }
        assert_eq!(acc_crc, crc32(&whole));
    }

    #[test]
    fn running_checksum_tracks_length_and_resets() {
        let mut rc = RunningChecksum::new();
        rc.update(b"abc");
        rc.update(b"def");
        assert_eq!(rc.len(), 6);
        assert_eq!(rc.value(), crc32(b"abcdef"));
        rc.reset();
        assert_eq!(rc.len(), 0);
        assert_eq!(rc.value(), crc32(b""));
    }
}
