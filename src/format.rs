//! Persisted index file format (spec §4.6, §6.3) — fixed binary header,
//! checkpoint-header table, and window-data region, all little-endian.

use crate::checkpoint::{Checkpoint, CheckpointStore, MAX_WINDOW_LEN};
use crate::error::{Error, Result};
use crate::offset::Offset;
use crate::stream::{read_fully, ByteStream, Whence};

const MAGIC: [u8; 4] = *b"ZIDX";
const VERSION: [u8; 2] = [0, 0];
const HEADER_SIZE: u64 = 50;
// spec.md's prose says "24 bytes each" but its own field table (uncomp
// offset 8 + comp offset 8 + bit count 1 + byte 1 + window file offset 8 +
// window length 2 + CRC-32 4) sums to 32; the table is the operative
// definition (see DESIGN.md's Open Questions) since a 24-byte stride would
// make recorded window offsets overlap the header table itself for any
// checkpoint with a non-empty window.
const CHECKPOINT_HEADER_SIZE: u64 = 32;

/// A filter invoked per checkpoint during export, deciding whether to keep
/// it (spec §4.6 supplement, grounded in
/// `zidx_export_filter_callback` in `examples/original_source/src/zidx.h`).
pub type ExportFilter<'a> = dyn FnMut(&Offset) -> Result<bool> + 'a;

/// A filter invoked per checkpoint during import, deciding whether to keep
/// it (grounded in `zidx_import_filter_callback`).
pub type ImportFilter<'a> = dyn FnMut(&Offset) -> Result<bool> + 'a;

fn write_u16(stream: &mut dyn ByteStream, v: u16) -> Result<()> {
    write_all(stream, &v.to_le_bytes())
}

fn write_u32(stream: &mut dyn ByteStream, v: u32) -> Result<()> {
    write_all(stream, &v.to_le_bytes())
}

fn write_i64(stream: &mut dyn ByteStream, v: i64) -> Result<()> {
    write_all(stream, &v.to_le_bytes())
}

fn write_all(stream: &mut dyn ByteStream, buf: &[u8]) -> Result<()> {
    let n = stream.write(buf);
    if n != buf.len() {
        return Err(Error::StreamWrite);
    }
    Ok(())
}

fn read_exact(stream: &mut dyn ByteStream, buf: &mut [u8]) -> Result<()> {
    let n = read_fully(stream, buf)?;
    if n != buf.len() {
        return Err(Error::StreamEof);
    }
    Ok(())
}

fn read_u16(stream: &mut dyn ByteStream) -> Result<u16> {
    let mut b = [0u8; 2];
    read_exact(stream, &mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn read_u32(stream: &mut dyn ByteStream) -> Result<u32> {
    let mut b = [0u8; 4];
    read_exact(stream, &mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_i64(stream: &mut dyn ByteStream) -> Result<i64> {
    let mut b = [0u8; 8];
    read_exact(stream, &mut b)?;
    Ok(i64::from_le_bytes(b))
}

fn u64_to_i64(v: u64) -> Result<i64> {
    i64::try_from(v).map_err(|_| Error::Overflow)
}

fn i64_to_u64(v: i64) -> Result<u64> {
    if v < 0 {
        return Err(Error::Corrupted("negative size field"));
    }
    Ok(v as u64)
}

/// What `export` needs from the index beyond its checkpoint list: the
/// running whole-stream checksum and the discovered sizes.
pub struct ExportInfo<'a> {
    pub checkpoints: &'a CheckpointStore,
    pub whole_stream_checksum: u32,
    pub file_type: u16,
    pub compressed_size: Option<u64>,
    pub uncompressed_size: Option<u64>,
}

/// Writes the full persisted format to `stream` (spec §6.3).
pub fn export(stream: &mut dyn ByteStream, info: &ExportInfo<'_>, mut filter: Option<&mut ExportFilter<'_>>) -> Result<()> {
    let mut kept: Vec<&Checkpoint> = Vec::with_capacity(info.checkpoints.count());
    for ckp in info.checkpoints.iter() {
        let keep = match filter.as_deref_mut() {
            Some(f) => f(&ckp.offset)?,
            None => true,
        };
        if keep {
            kept.push(ckp);
        }
    }

    let n = kept.len() as u32;

    // Header.
    write_all(stream, &MAGIC)?;
    write_all(stream, &VERSION)?;
    write_u16(stream, 0)?; // checksum algorithm kind (reserved)
    write_u32(stream, info.whole_stream_checksum)?;
    write_u32(stream, 0)?; // header checksum (reserved)
    write_u16(stream, info.file_type)?;
    write_i64(stream, u64_to_i64(info.compressed_size.unwrap_or(0))?)?;
    write_i64(stream, u64_to_i64(info.uncompressed_size.unwrap_or(0))?)?;
    write_u32(stream, 0)?; // file checksum (reserved)
    write_u32(stream, n)?;
    write_u32(stream, 0)?; // metadata checksum (reserved)
    write_u32(stream, 0)?; // flags (reserved)
    debug_assert_eq!(HEADER_SIZE, 4 + 2 + 2 + 4 + 4 + 2 + 8 + 8 + 4 + 4 + 4 + 4);

    // Checkpoint-header table, followed immediately by the window-data
    // region; windows are laid out in header order, contiguous.
    let mut window_offset = HEADER_SIZE + CHECKPOINT_HEADER_SIZE * n as u64;
    for ckp in &kept {
        write_i64(stream, u64_to_i64(ckp.offset.uncomp)?)?;
        write_i64(stream, u64_to_i64(ckp.offset.comp)?)?;
        write_all(stream, &[ckp.offset.bits_count, ckp.offset.byte])?;
        write_i64(stream, u64_to_i64(window_offset)?)?;
        write_u16(stream, ckp.window_len())?;
        write_u32(stream, ckp.checksum)?;
        window_offset += ckp.window().len() as u64;
    }

    for ckp in &kept {
        write_all(stream, ckp.window())?;
    }

    Ok(())
}

/// A checkpoint as read back from disk, before it is adopted into a store.
struct RawCheckpoint {
    offset: Offset,
    window_file_offset: u64,
    window_len: u16,
    checksum: u32,
}

/// Parsed header fields an importer needs, independent of the checkpoint list.
pub struct ImportedHeader {
    pub whole_stream_checksum: u32,
    pub file_type: u16,
    pub compressed_size: Option<u64>,
    pub uncompressed_size: Option<u64>,
}

/// Reads the full persisted format from `stream` into a fresh
/// [`CheckpointStore`] (the "shadow index" of spec §4.6): on any error,
/// nothing has been handed back to the caller yet, so the caller's own
/// index is untouched by construction.
pub fn import(
    stream: &mut dyn ByteStream,
    mut filter: Option<&mut ImportFilter<'_>>,
) -> Result<(CheckpointStore, ImportedHeader)> {
    let mut magic = [0u8; 4];
    read_exact(stream, &mut magic)?;
    if magic != MAGIC {
        return Err(Error::Corrupted("bad magic"));
    }
    let mut version = [0u8; 2];
    read_exact(stream, &mut version)?;
    // version is checked for informational purposes only; format 0.0 is the
    // only one ever shipped, but unknown/reserved fields are preserved and
    // left unvalidated per spec §4.6.
    let _checksum_kind = read_u16(stream)?;
    let whole_stream_checksum = read_u32(stream)?;
    let _header_checksum = read_u32(stream)?;
    let file_type = read_u16(stream)?;
    let compressed_size = i64_to_u64(read_i64(stream)?)?;
    let uncompressed_size = i64_to_u64(read_i64(stream)?)?;
    let _file_checksum = read_u32(stream)?;
    let count = read_u32(stream)?;
    let _metadata_checksum = read_u32(stream)?;
    let _flags = read_u32(stream)?;

    let mut raw = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let uncomp = i64_to_u64(read_i64(stream)?)?;
        let comp = i64_to_u64(read_i64(stream)?)?;
        let mut bits_byte = [0u8; 2];
        read_exact(stream, &mut bits_byte)?;
        let bits_count = bits_byte[0];
        let byte = bits_byte[1];
        if bits_count > 7 {
            return Err(Error::Corrupted("bits_count out of range"));
        }
        if bits_count == 0 && byte != 0 {
            return Err(Error::Corrupted("straddle byte set with zero bit count"));
        }
        let window_file_offset = i64_to_u64(read_i64(stream)?)?;
        let window_len = read_u16(stream)?;
        if window_len as usize > MAX_WINDOW_LEN {
            return Err(Error::Corrupted("window length exceeds 32768"));
        }
        let checksum = read_u32(stream)?;

        raw.push(RawCheckpoint {
            offset: Offset {
                uncomp,
                comp,
                bits_count,
                byte,
            },
            window_file_offset,
            window_len,
            checksum,
        });
    }

    let mut store = CheckpointStore::with_capacity(raw.len());
    let mut items = Vec::with_capacity(raw.len());
    for r in raw {
        let keep = match filter.as_deref_mut() {
            Some(f) => f(&r.offset)?,
            None => true,
        };
        if !keep {
            continue;
        }
        stream.seek(u64_to_i64(r.window_file_offset)?, Whence::Set)?;
        let mut window = vec![0u8; r.window_len as usize];
        read_exact(stream, &mut window)?;

        let ckp = Checkpoint::new(r.offset, window, r.checksum)?;
        items.push(ckp);
    }
    store.replace_all(items);

    Ok((
        store,
        ImportedHeader {
            whole_stream_checksum,
            file_type,
            compressed_size: if compressed_size == 0 { None } else { Some(compressed_size) },
            uncompressed_size: if uncompressed_size == 0 { None } else { Some(uncompressed_size) },
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::VecByteStream;

    fn sample_store() -> CheckpointStore {
        let mut store = CheckpointStore::new();
        store
            .add(Checkpoint::new(Offset { uncomp: 0, comp: 0, bits_count: 0, byte: 0 }, vec![], 0).unwrap())
            .unwrap();
        store
            .add(
                Checkpoint::new(
                    Offset { uncomp: 1000, comp: 400, bits_count: 3, byte: 0b1010_0000 },
                    (0..500u32).map(|x| x as u8).collect(),
                    0xDEADBEEF,
                )
                .unwrap(),
            )
            .unwrap();
        store
    }

    #[test]
    fn export_then_import_round_trips_checkpoints_and_sizes() {
        let store = sample_store();
        let info = ExportInfo {
            checkpoints: &store,
            whole_stream_checksum: 0x1234_5678,
            file_type: 1,
            compressed_size: Some(999),
            uncompressed_size: Some(1500),
        };
        let mut out = VecByteStream::new();
        export(&mut out, &info, None).unwrap();

        let mut input = VecByteStream::new();
        input.write(out.as_slice());
        input.seek(0, Whence::Set).unwrap();
        let (imported, header) = import(&mut input, None).unwrap();

        assert_eq!(imported.count(), store.count());
        for i in 0..store.count() {
            let a = store.get(i).unwrap();
            let b = imported.get(i).unwrap();
            assert_eq!(a.offset, b.offset);
            assert_eq!(a.window(), b.window());
            assert_eq!(a.checksum, b.checksum);
        }
        assert_eq!(header.whole_stream_checksum, 0x1234_5678);
        assert_eq!(header.compressed_size, Some(999));
        assert_eq!(header.uncompressed_size, Some(1500));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut input = VecByteStream::new();
        input.write(b"ZIDY\x00\x00");
        input.seek(0, Whence::Set).unwrap();
        assert!(matches!(import(&mut input, None), Err(Error::Corrupted(_))));
    }

    #[test]
    fn export_filter_drops_checkpoints() {
        let store = sample_store();
        let info = ExportInfo {
            checkpoints: &store,
            whole_stream_checksum: 0,
            file_type: 1,
            compressed_size: None,
            uncompressed_size: None,
        };
        let mut out = VecByteStream::new();
        let mut filter: Box<ExportFilter> = Box::new(|offset: &Offset| Ok(offset.uncomp != 0));
        export(&mut out, &info, Some(&mut *filter)).unwrap();

        let mut input = VecByteStream::new();
        input.write(out.as_slice());
        input.seek(0, Whence::Set).unwrap();
        let (imported, _) = import(&mut input, None).unwrap();
        assert_eq!(imported.count(), 1);
        assert_eq!(imported.get(0).unwrap().offset.uncomp, 1000);
    }
}
