//! Block index and first-line array (§4.3): two parallel arrays
//! describing where each block lives on disk and which line numbers
//! it holds.

use crate::codec;
use crate::error::{Result, ZlinesError};
use std::io::{Read, Seek, SeekFrom, Write};

/// On-disk size of one packed block index entry.
pub const BLOCK_INDEX_ENTRY_SIZE: usize = 24;

const LINE_DIR_COMPRESSED_FLAG: u64 = 1 << 63;
const LENGTH_MASK: u64 = !LINE_DIR_COMPRESSED_FLAG;

/// `(file_offset, compressed_length_x, decompressed_length)`. The top
/// bit of `compressed_length_x` is the line-directory-compressed flag;
/// the remaining 63 bits are the compressed content length.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockIndexEntry {
    pub file_offset: u64,
    compressed_length_x: u64,
    pub decompressed_length: u64,
}

impl BlockIndexEntry {
    pub fn new(
        file_offset: u64,
        compressed_length: u64,
        decompressed_length: u64,
        line_directory_compressed: bool,
    ) -> Self {
        debug_assert!(compressed_length & LINE_DIR_COMPRESSED_FLAG == 0);
        let flag = if line_directory_compressed { LINE_DIR_COMPRESSED_FLAG } else { 0 };
        Self {
            file_offset,
            compressed_length_x: compressed_length | flag,
            decompressed_length,
        }
    }

    pub fn compressed_length(&self) -> u64 {
        self.compressed_length_x & LENGTH_MASK
    }

    pub fn line_directory_compressed(&self) -> bool {
        self.compressed_length_x & LINE_DIR_COMPRESSED_FLAG != 0
    }

    fn to_bytes(self) -> [u8; BLOCK_INDEX_ENTRY_SIZE] {
        let mut buf = [0u8; BLOCK_INDEX_ENTRY_SIZE];
        buf[0..8].copy_from_slice(&self.file_offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.compressed_length_x.to_le_bytes());
        buf[16..24].copy_from_slice(&self.decompressed_length.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8]) -> Self {
        Self {
            file_offset: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            compressed_length_x: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            decompressed_length: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
        }
    }
}

/// The block index (`blocks`) and first-line array (`block_starts`).
/// `block_starts.len() == blocks.len().saturating_sub(1)`.
#[derive(Debug, Default)]
pub struct IndexTables {
    pub blocks: Vec<BlockIndexEntry>,
    pub block_starts: Vec<u64>,
}

impl IndexTables {
    /// The block containing `line_idx`.
    ///
    /// Smallest `b` such that `line_idx < block_starts[b]`, or the
    /// last block if no such `b` exists. Implemented as a binary
    /// search over the strictly increasing `block_starts`, which the
    /// spec permits (and recommends) over a linear scan.
    pub fn get_line_block(&self, line_idx: u64) -> u64 {
        if self.blocks.len() <= 1 {
            return 0;
        }
        let b = self.block_starts.partition_point(|&start| start <= line_idx);
        b.min(self.blocks.len() - 1) as u64
    }

    pub fn write<W: Write + Seek>(&self, mut w: W, compress: bool) -> Result<u64> {
        let start = w.stream_position()?;
        let blocks_bytes = serialize_blocks(&self.blocks);
        let starts_bytes = serialize_starts(&self.block_starts);

        if compress {
            let size_pos = w.stream_position()?;
            w.write_all(&[0u8; 16])?;

            let mut compressed_blocks = Vec::new();
            codec::compress_to_file(&mut compressed_blocks, &blocks_bytes)?;
            w.write_all(&compressed_blocks)?;

            let mut compressed_starts = Vec::new();
            codec::compress_to_file(&mut compressed_starts, &starts_bytes)?;
            w.write_all(&compressed_starts)?;

            let end_pos = w.stream_position()?;
            w.seek(SeekFrom::Start(size_pos))?;
            w.write_all(&(compressed_blocks.len() as u64).to_le_bytes())?;
            w.write_all(&(compressed_starts.len() as u64).to_le_bytes())?;
            w.seek(SeekFrom::Start(end_pos))?;
        } else {
            w.write_all(&blocks_bytes)?;
            w.write_all(&starts_bytes)?;
        }

        Ok(w.stream_position()? - start)
    }

    pub fn read<R: Read + Seek>(mut r: R, block_count: u64, compressed: bool) -> Result<Self> {
        let blocks_raw_size = block_count as usize * BLOCK_INDEX_ENTRY_SIZE;
        let starts_raw_size = block_count.saturating_sub(1) as usize * 8;

        let (blocks_bytes, starts_bytes) = if compressed {
            let mut size_buf = [0u8; 16];
            r.read_exact(&mut size_buf)?;
            let blocks_compressed_len = u64::from_le_bytes(size_buf[0..8].try_into().unwrap());
            let starts_compressed_len = u64::from_le_bytes(size_buf[8..16].try_into().unwrap());

            let mut blocks_raw = vec![0u8; blocks_raw_size];
            let n = codec::decompress_from_file(&mut r, blocks_compressed_len, 0, &mut blocks_raw)?;
            if n != blocks_raw_size {
                return Err(ZlinesError::Format(format!(
                    "block index decompressed to {n} bytes, expected {blocks_raw_size}"
                )));
            }

            let mut starts_raw = vec![0u8; starts_raw_size];
            let n = codec::decompress_from_file(&mut r, starts_compressed_len, 0, &mut starts_raw)?;
            if n != starts_raw_size {
                return Err(ZlinesError::Format(format!(
                    "first-line array decompressed to {n} bytes, expected {starts_raw_size}"
                )));
            }
            (blocks_raw, starts_raw)
        } else {
            let mut blocks_raw = vec![0u8; blocks_raw_size];
            r.read_exact(&mut blocks_raw)?;
            let mut starts_raw = vec![0u8; starts_raw_size];
            r.read_exact(&mut starts_raw)?;
            (blocks_raw, starts_raw)
        };

        Ok(Self {
            blocks: parse_blocks(&blocks_bytes),
            block_starts: parse_starts(&starts_bytes),
        })
    }
}

fn serialize_blocks(blocks: &[BlockIndexEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(blocks.len() * BLOCK_INDEX_ENTRY_SIZE);
    for entry in blocks {
        buf.extend_from_slice(&entry.to_bytes());
    }
    buf
}

fn parse_blocks(buf: &[u8]) -> Vec<BlockIndexEntry> {
    buf.chunks_exact(BLOCK_INDEX_ENTRY_SIZE)
        .map(BlockIndexEntry::from_bytes)
        .collect()
}

fn serialize_starts(starts: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(starts.len() * 8);
    for s in starts {
        buf.extend_from_slice(&s.to_le_bytes());
    }
    buf
}

fn parse_starts(buf: &[u8]) -> Vec<u64> {
    buf.chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> IndexTables {
        IndexTables {
            blocks: vec![
                BlockIndexEntry::new(256, 100, 400, false),
                BlockIndexEntry::new(356, 120, 400, true),
                BlockIndexEntry::new(476, 90, 200, false),
            ],
            block_starts: vec![10, 25],
        }
    }

    #[test]
    fn get_line_block_picks_the_right_block() {
        let idx = sample();
        assert_eq!(idx.get_line_block(0), 0);
        assert_eq!(idx.get_line_block(9), 0);
        assert_eq!(idx.get_line_block(10), 1);
        assert_eq!(idx.get_line_block(24), 1);
        assert_eq!(idx.get_line_block(25), 2);
        assert_eq!(idx.get_line_block(1000), 2);
    }

    #[test]
    fn single_block_always_resolves_to_zero() {
        let idx = IndexTables {
            blocks: vec![BlockIndexEntry::new(256, 10, 20, false)],
            block_starts: vec![],
        };
        assert_eq!(idx.get_line_block(0), 0);
        assert_eq!(idx.get_line_block(99), 0);
    }

    #[test]
    fn entry_flag_and_length_round_trip() {
        let e = BlockIndexEntry::new(1000, 12345, 99999, true);
        assert!(e.line_directory_compressed());
        assert_eq!(e.compressed_length(), 12345);
        let bytes = e.to_bytes();
        let parsed = BlockIndexEntry::from_bytes(&bytes);
        assert!(parsed.line_directory_compressed());
        assert_eq!(parsed.compressed_length(), 12345);
        assert_eq!(parsed.decompressed_length, 99999);
    }

    #[test]
    fn write_then_read_round_trips_compressed() {
        let idx = sample();
        let mut buf = Cursor::new(Vec::new());
        idx.write(&mut buf, true).unwrap();

        buf.set_position(0);
        let parsed = IndexTables::read(&mut buf, idx.blocks.len() as u64, true).unwrap();
        assert_eq!(parsed.block_starts, idx.block_starts);
        assert_eq!(parsed.blocks.len(), idx.blocks.len());
        for (a, b) in parsed.blocks.iter().zip(idx.blocks.iter()) {
            assert_eq!(a.file_offset, b.file_offset);
            assert_eq!(a.compressed_length(), b.compressed_length());
            assert_eq!(a.decompressed_length, b.decompressed_length);
            assert_eq!(a.line_directory_compressed(), b.line_directory_compressed());
        }
    }

    #[test]
    fn write_then_read_round_trips_uncompressed() {
        let idx = sample();
        let mut buf = Cursor::new(Vec::new());
        idx.write(&mut buf, false).unwrap();

        buf.set_position(0);
        let parsed = IndexTables::read(&mut buf, idx.blocks.len() as u64, false).unwrap();
        assert_eq!(parsed.block_starts, idx.block_starts);
        assert_eq!(parsed.blocks.len(), idx.blocks.len());
    }

    #[test]
    fn empty_index_round_trips() {
        let idx = IndexTables::default();
        let mut buf = Cursor::new(Vec::new());
        idx.write(&mut buf, true).unwrap();

        buf.set_position(0);
        let parsed = IndexTables::read(&mut buf, 0, true).unwrap();
        assert!(parsed.blocks.is_empty());
        assert!(parsed.block_starts.is_empty());
    }
}
