//! On-disk file header — 256 bytes, text, newline-terminated fields.
//!
//! ```text
//! zline v2.0
//! data_offset <u64>
//! index_offset <u64>
//! lines <u64>
//! blocks <u64>
//! maxlen <u64>
//! alg fzstd
//! [zi]            ; present iff index tables are codec-compressed
//! <blank line>
//! <space padding...>\n   ; final byte is always '\n', at offset 255
//! ```
//!
//! All numeric fields are written and parsed as ASCII decimal; the
//! format itself is little-endian only where it matters on disk (block
//! index entries, the first-line array), not in this text header.

use crate::error::{Result, ZlinesError};
use std::io::{Read, Seek, SeekFrom, Write};

pub const HEADER_SIZE: usize = 256;
pub const MAGIC_LINE: &str = "zline v2.0";
pub const ALGORITHM: &str = "fzstd";

#[derive(Debug, Clone)]
pub struct Header {
    pub data_offset: u64,
    pub index_offset: u64,
    pub lines: u64,
    pub blocks: u64,
    pub maxlen: u64,
    pub index_compressed: bool,
}

impl Header {
    /// A placeholder header written at `create()` time, before any block
    /// or index data exists.
    pub fn placeholder(index_compressed: bool) -> Self {
        Self {
            data_offset: HEADER_SIZE as u64,
            index_offset: 0,
            lines: 0,
            blocks: 0,
            maxlen: 0,
            index_compressed,
        }
    }

    /// Serialize to exactly `HEADER_SIZE` bytes: one field per line,
    /// a blank-line terminator, then space padding up to byte 255,
    /// where byte 255 is always `\n`.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut body = format!(
            "{magic}\ndata_offset {data}\nindex_offset {index}\nlines {lines}\n\
             blocks {blocks}\nmaxlen {maxlen}\nalg {alg}\n",
            magic = MAGIC_LINE,
            data = self.data_offset,
            index = self.index_offset,
            lines = self.lines,
            blocks = self.blocks,
            maxlen = self.maxlen,
            alg = ALGORITHM,
        );
        if self.index_compressed {
            body.push_str("zi\n");
        }
        body.push('\n');

        assert!(
            body.len() < HEADER_SIZE,
            "header body ({} bytes) does not fit in {} bytes",
            body.len(),
            HEADER_SIZE
        );

        let mut buf = [b' '; HEADER_SIZE];
        buf[..body.len()].copy_from_slice(body.as_bytes());
        buf[HEADER_SIZE - 1] = b'\n';
        buf
    }

    pub fn write<W: Write + Seek>(&self, mut w: W) -> Result<()> {
        w.seek(SeekFrom::Start(0))?;
        w.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Parse a header from exactly `HEADER_SIZE` bytes.
    ///
    /// `data_offset` and `index_offset` must both be nonzero — those two
    /// are always set to real values (`data_offset` at `create()`,
    /// `index_offset` at `close()`). `lines` and `blocks` are legitimately
    /// zero for an empty file and are not treated as a completeness check.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let text = std::str::from_utf8(buf)
            .map_err(|_| ZlinesError::Format("header is not valid UTF-8".into()))?;
        let mut lines_iter = text.lines();

        let first = lines_iter
            .next()
            .ok_or_else(|| ZlinesError::Format("empty header".into()))?;
        if !first.starts_with(MAGIC_LINE) {
            return Err(ZlinesError::Format(format!(
                "bad header prefix: expected {MAGIC_LINE:?}, got {first:?}"
            )));
        }

        let mut data_offset = None;
        let mut index_offset = None;
        let mut lines = None;
        let mut blocks = None;
        let mut maxlen = None;
        let mut index_compressed = false;

        for line in lines_iter {
            if line.is_empty() {
                break;
            }
            let mut parts = line.splitn(2, ' ');
            let word = parts.next().unwrap_or("");
            let rest = parts.next().unwrap_or("").trim();

            match word {
                "data_offset" => data_offset = Some(parse_u64(rest)?),
                "index_offset" => index_offset = Some(parse_u64(rest)?),
                "lines" => lines = Some(parse_u64(rest)?),
                "blocks" => blocks = Some(parse_u64(rest)?),
                "maxlen" => maxlen = Some(parse_u64(rest)?),
                "alg" => {
                    if rest != ALGORITHM {
                        return Err(ZlinesError::Format(format!(
                            "unrecognized compression algorithm: {rest:?}"
                        )));
                    }
                }
                "zi" => index_compressed = true,
                other => {
                    return Err(ZlinesError::Format(format!(
                        "unknown header field: {other:?}"
                    )))
                }
            }
        }

        let data_offset =
            data_offset.ok_or_else(|| ZlinesError::Format("missing data_offset".into()))?;
        let index_offset =
            index_offset.ok_or_else(|| ZlinesError::Format("missing index_offset".into()))?;
        let lines = lines.ok_or_else(|| ZlinesError::Format("missing lines".into()))?;
        let blocks = blocks.ok_or_else(|| ZlinesError::Format("missing blocks".into()))?;
        let maxlen = maxlen.unwrap_or(0);

        if data_offset == 0 || index_offset == 0 {
            return Err(ZlinesError::Format("file header incomplete".into()));
        }

        Ok(Self {
            data_offset,
            index_offset,
            lines,
            blocks,
            maxlen,
            index_compressed,
        })
    }

    pub fn read<R: Read + Seek>(mut r: R) -> Result<Self> {
        r.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; HEADER_SIZE];
        r.read_exact(&mut buf)?;
        Self::from_bytes(&buf)
    }
}

fn parse_u64(s: &str) -> Result<u64> {
    s.parse::<u64>()
        .map_err(|_| ZlinesError::Format(format!("expected an integer, got {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let h = Header {
            data_offset: 256,
            index_offset: 4096,
            lines: 1000,
            blocks: 7,
            maxlen: 123,
            index_compressed: true,
        };
        let buf = h.to_bytes();
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(buf[HEADER_SIZE - 1], b'\n');

        let parsed = Header::from_bytes(&buf).unwrap();
        assert_eq!(parsed.data_offset, 256);
        assert_eq!(parsed.index_offset, 4096);
        assert_eq!(parsed.lines, 1000);
        assert_eq!(parsed.blocks, 7);
        assert_eq!(parsed.maxlen, 123);
        assert!(parsed.index_compressed);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = [b' '; HEADER_SIZE];
        buf[..5].copy_from_slice(b"nope\n");
        buf[HEADER_SIZE - 1] = b'\n';
        assert!(Header::from_bytes(&buf).is_err());
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let text = "zline v2.0\ndata_offset 256\nindex_offset 512\nlines 1\nblocks 1\nmaxlen 1\nalg gzip\n\n";
        let mut buf = [b' '; HEADER_SIZE];
        buf[..text.len()].copy_from_slice(text.as_bytes());
        buf[HEADER_SIZE - 1] = b'\n';
        let err = Header::from_bytes(&buf).unwrap_err();
        assert!(matches!(err, ZlinesError::Format(_)));
    }

    #[test]
    fn allows_zero_lines_and_blocks() {
        let h = Header {
            data_offset: 256,
            index_offset: 256,
            lines: 0,
            blocks: 0,
            maxlen: 0,
            index_compressed: false,
        };
        let parsed = Header::from_bytes(&h.to_bytes()).unwrap();
        assert_eq!(parsed.lines, 0);
        assert_eq!(parsed.blocks, 0);
    }
}
