//! Unified writer/reader object (§4.5-4.7).
//!
//! A split `Writer`/`Reader` pair cannot serve reader queries while a
//! file is still being built, which the interleaving guarantee in
//! §4.6 requires. `ZlinesFile` owns the file handle, the index
//! tables, a write-side block buffer (present while `Building`), and
//! a lazily-populated read-side block cache, so one object covers
//! both halves of the state machine in §4.7.

use crate::block::{self, BlockBuffer, LineEntry};
use crate::codec;
use crate::error::{Result, ZlinesError};
use crate::header::{Header, HEADER_SIZE};
use crate::index::{BlockIndexEntry, IndexTables};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Building,
    Reading,
    Closed,
}

/// `(length, offset-within-block, block index)` for a single line,
/// matching the introspection the driver's `details -l` needs.
#[derive(Debug, Clone, Copy)]
pub struct LineDetails {
    pub length: u64,
    pub offset: u64,
    pub block_idx: u64,
}

/// A zlines container, open for either building or reading.
pub struct ZlinesFile {
    file: File,
    mode: Mode,
    header: Header,
    index: IndexTables,
    write_block: Option<BlockBuffer>,
    read_block: Option<BlockBuffer>,
    compress_index: bool,
    block_size: u64,
}

/// Seeks `file` back to `restore_to` when dropped, regardless of how
/// the scope that created it exits. Used to satisfy the interleaving
/// guarantee: any fseek a reader operation triggers while building is
/// followed, on return, by the writer's cursor being restored.
struct SeekRestore<'a> {
    file: &'a mut File,
    restore_to: Option<u64>,
}

impl<'a> Drop for SeekRestore<'a> {
    fn drop(&mut self) {
        if let Some(pos) = self.restore_to {
            let _ = self.file.seek(SeekFrom::Start(pos));
        }
    }
}

impl<'a> std::ops::Deref for SeekRestore<'a> {
    type Target = File;
    fn deref(&self) -> &File {
        self.file
    }
}

impl<'a> std::ops::DerefMut for SeekRestore<'a> {
    fn deref_mut(&mut self) -> &mut File {
        self.file
    }
}

fn copy_from(content: &[u8], entry: LineEntry, offset: u64, dst: &mut [u8]) -> usize {
    if offset >= entry.length {
        return 0;
    }
    let start = (entry.offset + offset) as usize;
    let avail = (entry.length - offset) as usize;
    let n = avail.min(dst.len());
    dst[..n].copy_from_slice(&content[start..start + n]);
    n
}

impl ZlinesFile {
    // ---- creation / opening ------------------------------------------------

    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_block_size(path, 0)
    }

    pub fn create_with_block_size(path: impl AsRef<Path>, block_size: u64) -> Result<Self> {
        Self::create_with_options(path, block_size, true)
    }

    pub fn create_with_options(path: impl AsRef<Path>, block_size: u64, compress_index: bool) -> Result<Self> {
        if block_size >= block::MAX_BLOCK_SIZE {
            return Err(ZlinesError::InvalidArgument(format!(
                "block_size {block_size} exceeds the maximum of {}",
                block::MAX_BLOCK_SIZE
            )));
        }
        let block_size = if block_size == 0 { block::DEFAULT_BLOCK_SIZE } else { block_size };

        let mut file = File::create(path)?;
        let header = Header::placeholder(compress_index);
        header.write(&mut file)?;

        Ok(Self {
            file,
            mode: Mode::Building,
            header,
            index: IndexTables::default(),
            write_block: Some(BlockBuffer::new_write(HEADER_SIZE as u64, block_size)),
            read_block: None,
            compress_index,
            block_size,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path)?;
        let header = Header::read(&mut file)?;

        file.seek(SeekFrom::Start(header.index_offset))?;
        let index = IndexTables::read(&mut file, header.blocks, header.index_compressed)?;

        Ok(Self {
            file,
            mode: Mode::Reading,
            compress_index: header.index_compressed,
            header,
            index,
            write_block: None,
            read_block: None,
            block_size: block::DEFAULT_BLOCK_SIZE,
        })
    }

    // ---- write path ---------------------------------------------------------

    pub fn add_line(&mut self, line: &[u8]) -> Result<u64> {
        if self.mode != Mode::Building {
            return Err(ZlinesError::Mode("add_line called on a file not open for building"));
        }

        let len = line.len() as u64;
        let line_idx = self.header.lines;

        if len > self.block_size {
            if !self.write_block.as_ref().unwrap().is_empty() {
                self.flush_block()?;
            }
            self.flush_oversize(line, line_idx)?;
        } else {
            let needs_flush = {
                let wb = self.write_block.as_ref().unwrap();
                wb.content_size() > 0 && wb.content_size() + len > self.block_size
            };
            if needs_flush {
                self.flush_block()?;
            }
            self.write_block.as_mut().unwrap().append(line);
        }

        self.header.lines += 1;
        self.header.maxlen = self.header.maxlen.max(len);
        Ok(line_idx)
    }

    fn flush_block(&mut self) -> Result<()> {
        let wb = self.write_block.as_ref().unwrap();
        if wb.is_empty() {
            return Ok(());
        }
        let offset = wb.offset;
        let first_line = wb.first_line;
        let lines = wb.lines.clone();
        let content = wb.content.clone();

        let (entry, dir_size) = self.emit_block(offset, first_line, &lines, &content)?;
        let next_offset = offset + dir_size + entry.compressed_length();
        self.write_block.as_mut().unwrap().reset_for_next(next_offset);
        Ok(())
    }

    fn flush_oversize(&mut self, line: &[u8], first_line: u64) -> Result<()> {
        let offset = self.write_block.as_ref().unwrap().offset;
        let entry_line = [LineEntry { offset: 0, length: line.len() as u64 }];
        let (entry, dir_size) = self.emit_block(offset, first_line, &entry_line, line)?;
        let next_offset = offset + dir_size + entry.compressed_length();
        self.write_block.as_mut().unwrap().reset_for_next(next_offset);
        Ok(())
    }

    /// Write one block's line directory and compressed content at the
    /// file's current cursor (`offset`), push its index entry, and
    /// return it along with the on-disk size of the directory (so the
    /// caller can compute the next block's offset).
    fn emit_block(
        &mut self,
        offset: u64,
        first_line: u64,
        lines: &[LineEntry],
        content: &[u8],
    ) -> Result<(BlockIndexEntry, u64)> {
        if !self.index.blocks.is_empty() {
            self.index.block_starts.push(first_line);
        }

        let dir_bytes = block::directory_bytes(lines);
        let mut directory_compressed = false;
        let dir_on_disk_size;

        if lines.len() >= 2 {
            let mut compressed = Vec::new();
            codec::compress_to_file(&mut compressed, &dir_bytes)?;
            if (compressed.len() as u64) + 8 < dir_bytes.len() as u64 {
                self.file.write_all(&(compressed.len() as u64).to_le_bytes())?;
                self.file.write_all(&compressed)?;
                dir_on_disk_size = 8 + compressed.len() as u64;
                directory_compressed = true;
            } else {
                self.file.write_all(&dir_bytes)?;
                dir_on_disk_size = dir_bytes.len() as u64;
            }
        } else {
            self.file.write_all(&dir_bytes)?;
            dir_on_disk_size = dir_bytes.len() as u64;
        }

        let compressed_content_len = codec::compress_to_file(&mut self.file, content)?;
        let entry = BlockIndexEntry::new(offset, compressed_content_len, content.len() as u64, directory_compressed);
        self.index.blocks.push(entry);

        Ok((entry, dir_on_disk_size))
    }

    /// Flush any pending block, write the index tables and final
    /// header, and release the file's internal buffers. A no-op if
    /// the file is already closed.
    pub fn close(&mut self) -> Result<()> {
        if self.mode == Mode::Closed {
            return Ok(());
        }

        if self.mode == Mode::Building {
            self.flush_block()?;

            let next_offset = self.write_block.as_ref().unwrap().offset;
            let pad = (8 - next_offset % 8) % 8;
            if pad > 0 {
                self.file.write_all(&vec![0u8; pad as usize])?;
            }
            let index_offset = next_offset + pad;

            self.file.seek(SeekFrom::Start(index_offset))?;
            self.index.write(&mut self.file, self.compress_index)?;

            self.header.blocks = self.index.blocks.len() as u64;
            self.header.index_offset = index_offset;
            self.header.write(&mut self.file)?;
            self.file.flush()?;
        }

        self.mode = Mode::Closed;
        self.write_block = None;
        self.read_block = None;
        Ok(())
    }

    // ---- read path ------------------------------------------------------

    pub fn line_count(&self) -> u64 {
        self.header.lines
    }

    pub fn max_line_length(&self) -> u64 {
        self.header.maxlen
    }

    pub fn line_length(&mut self, idx: u64) -> Result<u64> {
        if self.mode == Mode::Closed {
            return Err(ZlinesError::Mode("read query on a closed file"));
        }
        if idx >= self.header.lines {
            return Err(ZlinesError::LineOutOfRange(idx));
        }

        if self.mode == Mode::Building {
            let wb = self.write_block.as_ref().unwrap();
            if !wb.is_empty() && idx >= wb.first_line {
                return Ok(wb.lines[(idx - wb.first_line) as usize].length);
            }
        }

        let block_idx = self.index.get_line_block(idx);
        self.ensure_directory_loaded(block_idx)?;
        let rb = self.read_block.as_ref().unwrap();
        Ok(rb.lines[(idx - rb.first_line) as usize].length)
    }

    pub fn get_line(&mut self, idx: u64) -> Result<Vec<u8>> {
        let len = self.line_length(idx)?;
        let mut buf = vec![0u8; len as usize];
        let n = self.get_line_slice(idx, 0, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    pub fn get_line_slice(&mut self, idx: u64, offset: u64, dst: &mut [u8]) -> Result<usize> {
        if self.mode == Mode::Closed {
            return Err(ZlinesError::Mode("read query on a closed file"));
        }
        if idx >= self.header.lines {
            return Err(ZlinesError::LineOutOfRange(idx));
        }

        if self.mode == Mode::Building {
            let in_current = {
                let wb = self.write_block.as_ref().unwrap();
                !wb.is_empty() && idx >= wb.first_line
            };
            if in_current {
                let wb = self.write_block.as_ref().unwrap();
                let entry = wb.lines[(idx - wb.first_line) as usize];
                return Ok(copy_from(&wb.content, entry, offset, dst));
            }
        }

        let block_idx = self.index.get_line_block(idx);
        self.ensure_directory_loaded(block_idx)?;

        let (entry, oversize, content_file_offset, compressed_len) = {
            let rb = self.read_block.as_ref().unwrap();
            (
                rb.lines[(idx - rb.first_line) as usize],
                rb.oversize,
                rb.content_file_offset,
                rb.compressed_content_len,
            )
        };

        if oversize {
            let skip = offset.min(entry.length);
            let copy_len = ((entry.length - skip) as usize).min(dst.len());
            let restore_to = match self.mode {
                Mode::Building => self.write_block.as_ref().map(|wb| wb.offset),
                _ => None,
            };
            let mut guard = SeekRestore { file: &mut self.file, restore_to };
            guard.seek(SeekFrom::Start(content_file_offset))?;
            return codec::decompress_from_file(&mut *guard, compressed_len, skip, &mut dst[..copy_len]);
        }

        self.ensure_content_loaded()?;
        let rb = self.read_block.as_ref().unwrap();
        Ok(copy_from(&rb.content, entry, offset, dst))
    }

    fn ensure_directory_loaded(&mut self, block_idx: u64) -> Result<()> {
        let cached = self.read_block.as_ref().map(|rb| rb.idx == block_idx as i64).unwrap_or(false);
        if !cached {
            self.load_block_directory(block_idx)?;
        }
        Ok(())
    }

    fn load_block_directory(&mut self, block_idx: u64) -> Result<()> {
        let entry = *self
            .index
            .blocks
            .get(block_idx as usize)
            .ok_or(ZlinesError::BlockOutOfRange(block_idx))?;
        let first_line = if block_idx == 0 { 0 } else { self.index.block_starts[block_idx as usize - 1] };
        let next_start = self
            .index
            .block_starts
            .get(block_idx as usize)
            .copied()
            .unwrap_or(self.header.lines);
        let line_count = (next_start - first_line) as usize;

        let restore_to = match self.mode {
            Mode::Building => self.write_block.as_ref().map(|wb| wb.offset),
            _ => None,
        };

        let lines;
        let content_file_offset;
        {
            let mut guard = SeekRestore { file: &mut self.file, restore_to };
            guard.seek(SeekFrom::Start(entry.file_offset))?;
            lines = block::read_directory(&mut *guard, line_count, entry.line_directory_compressed())?;
            content_file_offset = guard.stream_position()?;
        }

        let oversize = line_count == 1 && entry.decompressed_length > block::DEFAULT_BLOCK_SIZE;

        let rb = self.read_block.get_or_insert_with(BlockBuffer::default);
        rb.idx = block_idx as i64;
        rb.offset = entry.file_offset;
        rb.first_line = first_line;
        rb.lines = lines;
        rb.content.clear();
        rb.content_loaded = false;
        rb.content_file_offset = content_file_offset;
        rb.compressed_content_len = entry.compressed_length();
        rb.decompressed_len = entry.decompressed_length;
        rb.oversize = oversize;
        Ok(())
    }

    fn ensure_content_loaded(&mut self) -> Result<()> {
        let (oversize, content_loaded, file_offset, compressed_len, decompressed_len) = {
            let rb = self.read_block.as_ref().unwrap();
            (rb.oversize, rb.content_loaded, rb.content_file_offset, rb.compressed_content_len, rb.decompressed_len)
        };
        if oversize || content_loaded {
            return Ok(());
        }

        let restore_to = match self.mode {
            Mode::Building => self.write_block.as_ref().map(|wb| wb.offset),
            _ => None,
        };

        let mut content = vec![0u8; decompressed_len as usize];
        {
            let mut guard = SeekRestore { file: &mut self.file, restore_to };
            guard.seek(SeekFrom::Start(file_offset))?;
            codec::decompress_from_file(&mut *guard, compressed_len, 0, &mut content)?;
        }

        let rb = self.read_block.as_mut().unwrap();
        rb.content = content;
        rb.content_loaded = true;
        Ok(())
    }

    // ---- introspection getters -------------------------------------------

    pub fn block_count(&self) -> u64 {
        self.index.blocks.len() as u64
    }

    pub fn block_offset(&self, block_idx: u64) -> Result<u64> {
        self.index
            .blocks
            .get(block_idx as usize)
            .map(|e| e.file_offset)
            .ok_or(ZlinesError::BlockOutOfRange(block_idx))
    }

    pub fn block_index_offset(&self) -> u64 {
        self.header.index_offset
    }

    pub fn block_line_count(&self, block_idx: u64) -> Result<u64> {
        if block_idx as usize >= self.index.blocks.len() {
            return Err(ZlinesError::BlockOutOfRange(block_idx));
        }
        let first = if block_idx == 0 { 0 } else { self.index.block_starts[block_idx as usize - 1] };
        let next = self.index.block_starts.get(block_idx as usize).copied().unwrap_or(self.header.lines);
        Ok(next - first)
    }

    pub fn block_size_original(&self, block_idx: u64) -> Result<u64> {
        self.index
            .blocks
            .get(block_idx as usize)
            .map(|e| e.decompressed_length)
            .ok_or(ZlinesError::BlockOutOfRange(block_idx))
    }

    pub fn block_size_compressed(&self, block_idx: u64) -> Result<u64> {
        self.index
            .blocks
            .get(block_idx as usize)
            .map(|e| e.compressed_length())
            .ok_or(ZlinesError::BlockOutOfRange(block_idx))
    }

    pub fn line_details(&mut self, idx: u64) -> Result<LineDetails> {
        let length = self.line_length(idx)?;

        if self.mode == Mode::Building {
            let wb = self.write_block.as_ref().unwrap();
            if !wb.is_empty() && idx >= wb.first_line {
                let offset = wb.lines[(idx - wb.first_line) as usize].offset;
                return Ok(LineDetails { length, offset, block_idx: wb.idx as u64 });
            }
        }

        let block_idx = self.index.get_line_block(idx);
        self.ensure_directory_loaded(block_idx)?;
        let rb = self.read_block.as_ref().unwrap();
        let offset = rb.lines[(idx - rb.first_line) as usize].offset;
        Ok(LineDetails { length, offset, block_idx })
    }
}
