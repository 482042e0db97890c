//! Export/import round trip through a real on-disk file, exercising
//! `FileByteStream` both as the compressed source and as the index-file
//! sink (spec §4.6, §6.3).

use std::io::Write;

use zidx::{ByteStream, FileByteStream, IndexBuilder, SpacingSpace, Whence};

fn pcg32_bytes(len: usize, seed: u64) -> Vec<u8> {
    use rand::RngCore;
    use rand_pcg::Pcg32;
    let mut rng = Pcg32::new(seed, 0xa02_bdbf7_bb3c_0a7);
    let mut out = vec![0u8; len];
    rng.fill_bytes(&mut out);
    out
}

fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

#[test]
fn round_trip_through_real_files() {
    let original = pcg32_bytes(400_000, 11);
    let compressed = gzip_bytes(&original);

    let dir = tempfile::tempdir().unwrap();
    let gz_path = dir.path().join("payload.gz");
    std::fs::write(&gz_path, &compressed).unwrap();

    let mut gz_stream = FileByteStream::open(&gz_path).unwrap();
    let mut index = IndexBuilder::new().build(&mut gz_stream).unwrap();
    index.build_index(8192, SpacingSpace::Uncompressed).unwrap();
    let built_count = index.checkpoints().count();
    assert!(built_count > 0);

    let idx_path = dir.path().join("payload.gz.zidx");
    let mut idx_out = FileByteStream::create(&idx_path).unwrap();
    index.export(&mut idx_out, None).unwrap();
    drop(idx_out);

    let mut gz_stream_2 = FileByteStream::open(&gz_path).unwrap();
    let mut index_2 = IndexBuilder::new().build(&mut gz_stream_2).unwrap();
    let mut idx_in = FileByteStream::open(&idx_path).unwrap();
    index_2.import(&mut idx_in, None).unwrap();

    assert_eq!(index_2.checkpoints().count(), built_count);
    assert_eq!(index_2.uncompressed_size(), Some(original.len() as u64));

    for &offset in &[0u64, 123_456, 399_000] {
        index_2.seek(offset, None).unwrap();
        let mut buf = [0u8; 2048];
        let n = index_2.read(&mut buf, None).unwrap();
        assert_eq!(&buf[..n], &original[offset as usize..offset as usize + n]);
    }

    // Exercise the write-seek-read path on FileByteStream directly.
    let mut scratch = FileByteStream::create(dir.path().join("scratch.bin")).unwrap();
    assert_eq!(scratch.write(b"hello"), 5);
    scratch.seek(0, Whence::Set).unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(scratch.read(&mut buf), 5);
    assert_eq!(&buf, b"hello");
}
