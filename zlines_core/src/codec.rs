//! Streaming codec adapter over a fixed-frame compression engine.
//!
//! The concrete engine is Zstandard at a fixed compression level
//! ("fzstd" in the file header — this version accepts no other
//! algorithm). The adapter is deliberately narrow: three operations,
//! matching the abstract `init_stream` / `step` / `end_stream` shape a
//! streaming engine exposes, realized here over `zstd`'s raw streaming
//! API (`zstd::stream::raw::{Encoder, Decoder, Operation}`) rather than
//! the one-shot `zstd::bulk`/`zstd::stream::copy_encode` helpers, since
//! the write path must stream directly into an open file and the read
//! path must support discarding a prefix of the decompressed output
//! without materializing it.

use crate::error::{Result, ZlinesError};
use std::io::{Read, Write};
use zstd::stream::raw::{Decoder, Encoder, InBuffer, Operation, OutBuffer};

/// Fixed compression level for the "fzstd" algorithm. Frozen for this
/// format version; never negotiated.
pub const COMPRESSION_LEVEL: i32 = 3;

const STREAM_BUFFER_SIZE: usize = 8 * 1024;

/// Upper bound on the compressed size of an `n`-byte input, used to
/// size output buffers before compressing.
pub fn max_compressed_size(n: usize) -> usize {
    zstd_safe::compress_bound(n)
}

fn codec_err(e: impl std::fmt::Display) -> ZlinesError {
    ZlinesError::Codec(e.to_string())
}

/// Stream `src` through the encoder into `dst` at its current cursor.
///
/// Uses an 8 KiB internal output buffer, flushing to `dst` only when
/// full (or at the end). Calls `finish` repeatedly until the encoder
/// reports the frame is complete, so the trailing frame bytes land
/// immediately after the content bytes with no gap.
///
/// Returns the exact number of bytes written to `dst`.
pub fn compress_to_file<W: Write>(mut dst: W, src: &[u8]) -> Result<u64> {
    let mut encoder = Encoder::new(COMPRESSION_LEVEL).map_err(codec_err)?;
    let mut out_buf = [0u8; STREAM_BUFFER_SIZE];
    let mut written = 0u64;

    let mut input = InBuffer::around(src);
    while input.pos < input.src.len() {
        let mut output = OutBuffer::around(&mut out_buf[..]);
        encoder.run(&mut input, &mut output).map_err(codec_err)?;
        let produced = output.pos();
        if produced > 0 {
            dst.write_all(&out_buf[..produced])?;
            written += produced as u64;
        }
    }

    loop {
        let mut output = OutBuffer::around(&mut out_buf[..]);
        let remaining = encoder.finish(&mut output, true).map_err(codec_err)?;
        let produced = output.pos();
        if produced > 0 {
            dst.write_all(&out_buf[..produced])?;
            written += produced as u64;
        }
        if remaining == 0 {
            break;
        }
    }

    Ok(written)
}

/// Read up to `compressed_len` bytes from `src`'s current cursor,
/// decompress them, discard the first `skip_bytes` of decompressed
/// output, then copy decompressed bytes into `dst` until `dst` is full
/// or the compressed input is exhausted.
///
/// Returns the number of bytes written into `dst`. The caller is
/// responsible for knowing the expected total output size (from the
/// block index) and sizing `dst`/`skip_bytes` accordingly.
pub fn decompress_from_file<R: Read>(
    mut src: R,
    compressed_len: u64,
    skip_bytes: u64,
    dst: &mut [u8],
) -> Result<usize> {
    let mut decoder = Decoder::new().map_err(codec_err)?;
    let mut in_buf = [0u8; STREAM_BUFFER_SIZE];
    let mut scratch = [0u8; STREAM_BUFFER_SIZE];

    let mut remaining_compressed = compressed_len;
    let mut to_skip = skip_bytes;
    let mut written = 0usize;

    while remaining_compressed > 0 && written < dst.len() {
        let chunk = remaining_compressed.min(in_buf.len() as u64) as usize;
        src.read_exact(&mut in_buf[..chunk])?;
        remaining_compressed -= chunk as u64;

        let mut input = InBuffer::around(&in_buf[..chunk]);
        while input.pos < input.src.len() {
            if to_skip > 0 {
                let take = to_skip.min(scratch.len() as u64) as usize;
                let mut output = OutBuffer::around(&mut scratch[..take]);
                decoder.run(&mut input, &mut output).map_err(codec_err)?;
                to_skip -= output.pos() as u64;
            } else {
                if written >= dst.len() {
                    break;
                }
                let mut output = OutBuffer::around(&mut dst[written..]);
                decoder.run(&mut input, &mut output).map_err(codec_err)?;
                written += output.pos();
            }
        }
    }

    Ok(written)
}
