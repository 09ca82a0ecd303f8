//! `zlines` — command-line driver for the zlines container
//! (`create` / `print` / `get` / `details` / `verify`).
//!
//! This binary is an external collaborator against `zlines_core`'s public
//! API only; it owns no on-disk format knowledge beyond what
//! `zlines_core::ZlinesFile` exposes.

mod humanize;
mod range;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use humanize::{commafy, human_bytes};
use zlines_core::ZlinesFile;

/// Matches `CREATE_FILE_UPDATE_FREQUENCY_BYTES` in the original source:
/// a status line is printed every 50 MiB of input consumed.
const CREATE_STATUS_FREQUENCY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "zlines", about = "Compact random-access container for large line collections", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a zlines file from a text file (one line per record)
    Create {
        /// Destination .zlines file
        out_file: PathBuf,
        /// Source text file, or "-" to read stdin
        in_file: String,
        /// Bytes per compression block
        #[arg(short = 'b', long = "block-size")]
        block_size: Option<u64>,
        /// Suppress progress output
        #[arg(short = 'q', long)]
        quiet: bool,
        /// Store the block index and first-line array uncompressed
        #[arg(short = 'c', long = "no-compress-index")]
        no_compress_index: bool,
    },
    /// Print every line in the file
    Print { file: PathBuf },
    /// Extract one or more lines or Python-slice-style ranges
    Get {
        file: PathBuf,
        /// Line index or range (e.g. `23`, `10:100`, `-10:`, `::-1`)
        #[arg(required = true)]
        selectors: Vec<String>,
    },
    /// Print internal details about a zlines file
    Details {
        file: PathBuf,
        /// Print per-block statistics
        #[arg(short = 'b', long)]
        blocks: bool,
        /// Print per-line statistics
        #[arg(short = 'l', long)]
        lines: bool,
    },
    /// Compare a zlines file against a text file, line by line
    Verify { file: PathBuf, text_file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let ok = match cli.command {
        Commands::Create { out_file, in_file, block_size, quiet, no_compress_index } => {
            run_create(&out_file, &in_file, block_size, quiet, !no_compress_index)
        }
        Commands::Print { file } => run_print(&file),
        Commands::Get { file, selectors } => run_get(&file, &selectors),
        Commands::Details { file, blocks, lines } => run_details(&file, blocks, lines),
        Commands::Verify { file, text_file } => run_verify(&file, &text_file),
    }?;
    std::process::exit(if ok { 0 } else { 1 });
}

fn open_text_input(name: &str) -> Result<Box<dyn BufRead>> {
    if name == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        let f = File::open(name).with_context(|| format!("cannot read {name:?}"))?;
        Ok(Box::new(BufReader::new(f)))
    }
}

/// Strip a trailing `\n` and, if present before it, `\r`.
fn trim_newline(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}

fn status_output(quiet: bool, line_count: u64, byte_count: u64, file_size: u64) {
    if quiet {
        return;
    }
    print!("\r{} lines, {} bytes", commafy(line_count), commafy(byte_count));
    if file_size > 0 {
        print!(" of {} ({:.1}%)", commafy(file_size), byte_count as f64 * 100.0 / file_size as f64);
    }
    let _ = io::stdout().flush();
}

fn run_create(out_file: &PathBuf, in_file: &str, block_size: Option<u64>, quiet: bool, compress_index: bool) -> Result<bool> {
    let input_size = if in_file == "-" { 0 } else { std::fs::metadata(in_file).map(|m| m.len()).unwrap_or(0) };
    let mut input = open_text_input(in_file)?;

    let mut zf = ZlinesFile::create_with_options(out_file, block_size.unwrap_or(0), compress_index)
        .with_context(|| format!("creating {out_file:?}"))?;

    let mut total_bytes = 0u64;
    let mut next_update = CREATE_STATUS_FREQUENCY_BYTES;
    let mut min_len = u64::MAX;
    let mut max_len = 0u64;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = input.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        total_bytes += n as u64;

        if total_bytes >= next_update {
            status_output(quiet, zf.line_count(), total_bytes, input_size);
            next_update = total_bytes + CREATE_STATUS_FREQUENCY_BYTES;
        }

        trim_newline(&mut line);
        let len = line.len() as u64;
        max_len = max_len.max(len);
        min_len = min_len.min(len);

        zf.add_line(&line)?;
    }

    status_output(quiet, zf.line_count(), total_bytes, input_size);
    zf.close()?;

    let output_size = std::fs::metadata(out_file)?.len();

    let mut zf = ZlinesFile::open(out_file)?;
    let mut total_compressed = 0u64;
    for b in 0..zf.block_count() {
        total_compressed += zf.block_size_compressed(b)?;
    }
    let overhead = output_size.saturating_sub(total_compressed);

    if !quiet {
        println!();
        if zf.line_count() > 0 {
            println!("line lengths {}..{}", min_len, max_len);
        }
        let block_count = zf.block_count();
        println!(
            "compressed to {} bytes in {} block{}",
            commafy(total_compressed),
            commafy(block_count),
            if block_count == 1 { "" } else { "s" }
        );
        if zf.line_count() > 0 {
            println!(
                "{} bytes overhead, {:.2} bytes per line",
                commafy(overhead),
                overhead as f64 / zf.line_count() as f64
            );
        }
    }

    zf.close()?;
    Ok(true)
}

fn run_print(file: &PathBuf) -> Result<bool> {
    let mut zf = ZlinesFile::open(file).with_context(|| format!("failed to open {file:?} for reading"))?;
    let count = zf.line_count();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for i in 0..count {
        let line = zf.get_line(i)?;
        out.write_all(&line)?;
        out.write_all(b"\n")?;
    }
    Ok(true)
}

fn run_get(file: &PathBuf, selectors: &[String]) -> Result<bool> {
    let mut zf = ZlinesFile::open(file).with_context(|| format!("failed to open {file:?} for reading"))?;
    let count = zf.line_count();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut ok = true;

    for sel in selectors {
        let parsed = match range::parse(sel) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Invalid line number range {sel:?}: {e}");
                ok = false;
                continue;
            }
        };
        let indices = match range::expand(parsed, count) {
            Ok(indices) => indices,
            Err(e) => {
                eprintln!("Invalid line number range {sel:?}: {e}");
                ok = false;
                continue;
            }
        };
        for idx in indices {
            let line = zf.get_line(idx as u64)?;
            out.write_all(&line)?;
            out.write_all(b"\n")?;
        }
    }
    Ok(ok)
}

fn run_details(file: &PathBuf, show_blocks: bool, show_lines: bool) -> Result<bool> {
    let mut zf = ZlinesFile::open(file).with_context(|| format!("failed to open {file:?} for reading"))?;

    println!("{} lines, longest line {} bytes", zf.line_count(), human_bytes(zf.max_line_length()));
    println!("data begins at offset {}", human_bytes(zf.block_offset(0).unwrap_or(0)));
    println!("block index at offset {}", human_bytes(zf.block_index_offset()));
    println!("{} compressed blocks", zf.block_count());

    if show_blocks {
        for b in 0..zf.block_count() {
            println!(
                "block {b}: {} lines, {}->{}, offset {}",
                zf.block_line_count(b)?,
                human_bytes(zf.block_size_original(b)?),
                human_bytes(zf.block_size_compressed(b)?),
                human_bytes(zf.block_offset(b)?),
            );
        }
    }

    if show_lines {
        for i in 0..zf.line_count() {
            let d = zf.line_details(i)?;
            println!("line {i}: in block {}, offset {}, len {}", d.block_idx, d.offset, d.length);
        }
    }

    Ok(true)
}

fn run_verify(file: &PathBuf, text_file: &PathBuf) -> Result<bool> {
    let mut zf = ZlinesFile::open(file).with_context(|| format!("failed to open {file:?} for reading"))?;
    let line_count = zf.line_count();

    let text_path = text_file.to_str().unwrap_or_default();
    let mut input = open_text_input(text_path)?;

    let mut line_idx = 0u64;
    let mut err_count = 0u32;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = input.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        trim_newline(&mut line);

        if line_idx >= line_count {
            println!("Error: {} lines in {:?}, but {:?} contains more", line_count, file, text_file);
            return Ok(false);
        }

        let extracted = zf.get_line(line_idx)?;
        if extracted != line {
            println!("Line {line_idx} mismatch.");
            err_count += 1;
            if err_count == 10 {
                println!("Too many errors. Exiting.");
                return Ok(false);
            }
        }

        line_idx += 1;
    }

    if line_idx != line_count {
        println!("Error: {} lines in {:?}, but {:?} contains {}", line_idx, text_file, file, line_count);
        err_count += 1;
    }

    if err_count == 0 {
        println!("No errors");
    }

    Ok(err_count == 0)
}
