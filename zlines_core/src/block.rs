//! In-memory block buffer (§4.2) — the write-side accumulator and the
//! read-side cache share this one type, distinguished only by which
//! half of [`crate::file::ZlinesFile`] populated it.

use crate::codec;
use crate::error::Result;
use std::io::Read;

/// Default content capacity for a write-side block: 4 MiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Block sizes must stay below 2^31 bytes.
pub const MAX_BLOCK_SIZE: u64 = 1 << 31;

/// On-disk size of one packed line-directory entry.
pub const LINE_ENTRY_SIZE: usize = 16;

/// One `(offset, length)` record locating a line inside a block's
/// content bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineEntry {
    pub offset: u64,
    pub length: u64,
}

/// A single in-memory block.
///
/// On the write side, `idx`/`offset`/`first_line` track the block
/// currently being accumulated; `lines`/`content` grow as
/// [`BlockBuffer::append`] is called. On the read side, the same
/// fields describe whichever block was most recently loaded, plus a
/// few read-only bookkeeping fields (`content_loaded`, `oversize`,
/// `content_file_offset`, `compressed_content_len`, `decompressed_len`)
/// that only the read path populates.
#[derive(Debug, Default)]
pub struct BlockBuffer {
    /// -1 for an unassigned read cache, >= 0 for a real block.
    pub idx: i64,
    /// File offset where this block begins on disk.
    pub offset: u64,
    pub first_line: u64,
    pub lines: Vec<LineEntry>,
    pub content: Vec<u8>,

    /// Write-side content capacity; unused on the read side.
    capacity: u64,

    /// Read-side only: has `content` actually been decompressed?
    pub content_loaded: bool,
    /// Read-side only: this block is a single oversize line whose
    /// content is never materialized in full; every read streams
    /// directly from disk.
    pub oversize: bool,
    /// Read-side only: file offset immediately after this block's
    /// line directory, i.e. where its compressed content starts.
    pub content_file_offset: u64,
    /// Read-side only: on-disk compressed content length.
    pub compressed_content_len: u64,
    /// Read-side only: expected decompressed content length.
    pub decompressed_len: u64,
}

impl BlockBuffer {
    /// A fresh write-side accumulator starting at `offset` with room
    /// for `capacity` bytes of line content.
    pub fn new_write(offset: u64, capacity: u64) -> Self {
        Self {
            idx: 0,
            offset,
            capacity,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn content_size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Append a line's bytes to the buffer, recording its directory
    /// entry. Callers are responsible for flushing first when the
    /// line would overflow `capacity`.
    pub fn append(&mut self, line: &[u8]) -> LineEntry {
        let entry = LineEntry {
            offset: self.content.len() as u64,
            length: line.len() as u64,
        };
        self.content.extend_from_slice(line);
        self.lines.push(entry);
        entry
    }

    /// Reset for the next block: advance `idx`, move `first_line`
    /// past the lines just flushed, clear `lines`/`content`, and point
    /// `offset` at `next_offset`.
    pub fn reset_for_next(&mut self, next_offset: u64) {
        self.first_line += self.lines.len() as u64;
        self.idx += 1;
        self.offset = next_offset;
        self.lines.clear();
        self.content.clear();
    }
}

/// Serialize a line directory to its packed on-disk form: each entry
/// is `offset:u64 || length:u64`, little-endian, back to back.
pub fn directory_bytes(lines: &[LineEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(lines.len() * LINE_ENTRY_SIZE);
    for line in lines {
        buf.extend_from_slice(&line.offset.to_le_bytes());
        buf.extend_from_slice(&line.length.to_le_bytes());
    }
    buf
}

fn parse_directory(buf: &[u8]) -> Vec<LineEntry> {
    buf.chunks_exact(LINE_ENTRY_SIZE)
        .map(|chunk| LineEntry {
            offset: u64::from_le_bytes(chunk[0..8].try_into().unwrap()),
            length: u64::from_le_bytes(chunk[8..16].try_into().unwrap()),
        })
        .collect()
}

/// Read a `line_count`-entry line directory from `r`'s current
/// position, decompressing it first if `compressed` is set.
pub fn read_directory<R: Read>(mut r: R, line_count: usize, compressed: bool) -> Result<Vec<LineEntry>> {
    let raw_size = line_count * LINE_ENTRY_SIZE;

    let raw = if compressed {
        let mut len_buf = [0u8; 8];
        r.read_exact(&mut len_buf)?;
        let compressed_len = u64::from_le_bytes(len_buf);
        let mut out = vec![0u8; raw_size];
        let n = codec::decompress_from_file(&mut r, compressed_len, 0, &mut out)?;
        if n != raw_size {
            return Err(crate::error::ZlinesError::Format(format!(
                "line directory decompressed to {n} bytes, expected {raw_size}"
            )));
        }
        out
    } else {
        let mut out = vec![0u8; raw_size];
        r.read_exact(&mut out)?;
        out
    };

    Ok(parse_directory(&raw))
}
