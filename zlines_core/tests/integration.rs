//! Acceptance tests for the zlines container, covering the testable
//! properties spec'd against `ZlinesFile`: round-trip, slice correctness,
//! idempotence of close, index-table compression transparency,
//! block-boundary behavior, interleaved read during build, monotonicity,
//! and the seed end-to-end scenarios.

use proptest::prelude::*;
use tempfile::NamedTempFile;
use zlines_core::ZlinesFile;

fn temp_path() -> std::path::PathBuf {
    NamedTempFile::new().unwrap().into_temp_path().keep().unwrap()
}

fn write_all(path: &std::path::Path, lines: &[Vec<u8>], block_size: u64) {
    let mut zf = ZlinesFile::create_with_block_size(path, block_size).unwrap();
    for line in lines {
        zf.add_line(line).unwrap();
    }
    zf.close().unwrap();
}

fn read_all(path: &std::path::Path) -> Vec<Vec<u8>> {
    let mut zf = ZlinesFile::open(path).unwrap();
    (0..zf.line_count()).map(|i| zf.get_line(i).unwrap()).collect()
}

// ── seed scenarios (§8) ──────────────────────────────────────────────────

#[test]
fn empty_file() {
    let path = temp_path();
    let mut zf = ZlinesFile::create(&path).unwrap();
    zf.close().unwrap();

    let mut zf = ZlinesFile::open(&path).unwrap();
    assert_eq!(zf.line_count(), 0);
    assert_eq!(zf.max_line_length(), 0);
    assert!(zf.line_length(0).is_err());
    assert!(zf.get_line(0).is_err());
}

#[test]
fn single_line() {
    let path = temp_path();
    write_all(&path, &[b"foo".to_vec()], 0);

    let mut zf = ZlinesFile::open(&path).unwrap();
    assert_eq!(zf.line_count(), 1);
    assert_eq!(zf.max_line_length(), 3);
    assert_eq!(zf.line_length(0).unwrap(), 3);
    assert_eq!(zf.get_line(0).unwrap(), b"foo");
    assert!(zf.get_line(1).is_err());
}

#[test]
fn four_short_lines() {
    let path = temp_path();
    let lines: Vec<Vec<u8>> = vec![b"foo".to_vec(), b"bar".to_vec(), b"".to_vec(), b"gonzo".to_vec()];
    write_all(&path, &lines, 0);

    let mut zf = ZlinesFile::open(&path).unwrap();
    assert_eq!(zf.line_count(), 4);
    assert_eq!(zf.max_line_length(), 5);
    for (i, expected) in lines.iter().enumerate() {
        assert_eq!(zf.line_length(i as u64).unwrap(), expected.len() as u64);
        assert_eq!(&zf.get_line(i as u64).unwrap(), expected);
    }
}

#[test]
fn small_block_size_spans_multiple_blocks() {
    let path = temp_path();
    let a = vec![b'A'; 80];
    let b = vec![b'B'; 20];
    let c = vec![b'C'; 8];
    write_all(&path, &[a.clone(), b.clone(), c.clone()], 100);

    let mut zf = ZlinesFile::open(&path).unwrap();
    assert_eq!(zf.line_count(), 3);
    assert_eq!(zf.get_line(0).unwrap(), a);
    assert_eq!(zf.get_line(1).unwrap(), b);
    assert_eq!(zf.get_line(2).unwrap(), c);
    assert!(zf.block_count() >= 2);
}

#[test]
fn oversize_line_becomes_single_line_block() {
    let path = temp_path();
    let short = b"this has 11".to_vec();
    let long: Vec<u8> = b"this is 50 chars .............................. long"[..50].to_vec();
    write_all(&path, &[short.clone(), long.clone()], 20);

    let mut zf = ZlinesFile::open(&path).unwrap();
    assert_eq!(zf.get_line(0).unwrap(), short);
    assert_eq!(zf.get_line(1).unwrap(), long);

    // Slicing into the oversize line streams from disk rather than a cache.
    let mut buf = vec![0u8; 10];
    let n = zf.get_line_slice(1, 5, &mut buf).unwrap();
    assert_eq!(&buf[..n], &long[5..15]);
}

#[test]
fn a_thousand_lines_any_order() {
    let path = temp_path();
    let lines: Vec<Vec<u8>> = (0..1000).map(|i| format!("test line {i:>10}").into_bytes()).collect();
    write_all(&path, &lines, 0);

    let mut zf = ZlinesFile::open(&path).unwrap();
    assert_eq!(zf.line_count(), 1000);

    // arbitrary order, including backwards and interleaved
    for i in (0..1000).rev() {
        assert_eq!(zf.get_line(i).unwrap(), lines[i as usize]);
    }
    for &i in &[500u64, 3, 999, 0, 501] {
        assert_eq!(zf.get_line(i).unwrap(), lines[i as usize]);
    }
}

// ── idempotence / transparency ───────────────────────────────────────────

#[test]
fn building_the_same_sequence_twice_decodes_identically() {
    let lines: Vec<Vec<u8>> =
        (0..200).map(|i| format!("line-{i}-{}", "x".repeat(i % 17)).into_bytes()).collect();

    let path_a = temp_path();
    let path_b = temp_path();
    write_all(&path_a, &lines, 256);
    write_all(&path_b, &lines, 256);

    assert_eq!(read_all(&path_a), read_all(&path_b));
}

#[test]
fn index_compression_is_transparent() {
    let lines: Vec<Vec<u8>> = (0..500).map(|i| format!("row {i}").into_bytes()).collect();

    let compressed_path = temp_path();
    let mut zf = ZlinesFile::create_with_options(&compressed_path, 512, true).unwrap();
    for l in &lines {
        zf.add_line(l).unwrap();
    }
    zf.close().unwrap();

    let uncompressed_path = temp_path();
    let mut zf = ZlinesFile::create_with_options(&uncompressed_path, 512, false).unwrap();
    for l in &lines {
        zf.add_line(l).unwrap();
    }
    zf.close().unwrap();

    assert_eq!(read_all(&compressed_path), read_all(&uncompressed_path));
}

#[test]
fn double_close_is_a_safe_no_op() {
    let path = temp_path();
    let mut zf = ZlinesFile::create(&path).unwrap();
    zf.add_line(b"hello").unwrap();
    zf.close().unwrap();
    zf.close().unwrap();

    let mut zf = ZlinesFile::open(&path).unwrap();
    assert_eq!(zf.get_line(0).unwrap(), b"hello");
}

// ── interleaved read during build ────────────────────────────────────────

#[test]
fn get_line_during_build_sees_lines_already_added() {
    let path = temp_path();
    let mut zf = ZlinesFile::create_with_block_size(&path, 64).unwrap();

    let lines: Vec<Vec<u8>> = (0..50).map(|i| format!("item-{i:03}").into_bytes()).collect();
    for (i, line) in lines.iter().enumerate() {
        zf.add_line(line).unwrap();
        for j in 0..=i {
            assert_eq!(zf.get_line(j as u64).unwrap(), lines[j], "line {j} while building at {i}");
        }
    }

    zf.close().unwrap();
    assert_eq!(read_all(&path), lines);
}

// ── monotonicity ──────────────────────────────────────────────────────────

#[test]
fn block_offsets_and_first_lines_are_strictly_increasing() {
    let path = temp_path();
    let lines: Vec<Vec<u8>> = (0..300).map(|i| format!("payload-{i}").into_bytes()).collect();
    write_all(&path, &lines, 128);

    let mut zf = ZlinesFile::open(&path).unwrap();
    let block_count = zf.block_count();
    assert!(block_count > 1);

    let mut last_offset = None;
    for b in 0..block_count {
        let offset = zf.block_offset(b).unwrap();
        if let Some(prev) = last_offset {
            assert!(offset > prev, "block offsets must be strictly increasing");
        }
        last_offset = Some(offset);
    }
}

// ── slice correctness (property-based) ───────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn round_trip_holds_for_arbitrary_line_sets(
        lines in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 0..60),
        block_size in 32u64..2048,
    ) {
        let path = temp_path();
        write_all(&path, &lines, block_size);

        let mut zf = ZlinesFile::open(&path).unwrap();
        prop_assert_eq!(zf.line_count(), lines.len() as u64);
        let expected_max = lines.iter().map(|l| l.len() as u64).max().unwrap_or(0);
        prop_assert_eq!(zf.max_line_length(), expected_max);

        for (i, expected) in lines.iter().enumerate() {
            prop_assert_eq!(zf.line_length(i as u64).unwrap(), expected.len() as u64);
            prop_assert_eq!(&zf.get_line(i as u64).unwrap(), expected);
        }
    }

    #[test]
    fn slices_match_the_source_line_at_every_offset(
        line in prop::collection::vec(any::<u8>(), 0..120),
        filler in prop::collection::vec(any::<u8>(), 0..5),
    ) {
        let path = temp_path();
        write_all(&path, &[filler, line.clone()], 64);

        let mut zf = ZlinesFile::open(&path).unwrap();
        let len = line.len() as u64;

        for off in 0..=(len + 2) {
            for dst_len in 1..=(len as usize + 3) {
                let mut buf = vec![0xAAu8; dst_len];
                let n = zf.get_line_slice(1, off, &mut buf).unwrap();
                if off >= len {
                    prop_assert_eq!(n, 0);
                } else {
                    let expected_end = ((off + dst_len as u64).min(len)) as usize;
                    let expected = &line[off as usize..expected_end];
                    prop_assert_eq!(&buf[..n], expected);
                }
            }
        }
    }
}
