//! Python-slice-style range expressions for `zlines get` (`23`, `10:100`,
//! `-10:`, `:100`, `0:20:2`, `::-1`).
//!
//! Grounded in `parseRange`/`checkLineNumbers` in
//! `original_source/zlines/zlines.c`: a `Range` is `(start, end, step)` with
//! flags for whether `start`/`end` were given explicitly, plus the source's
//! `step == 0` special case for a bare integer ("just line 23").

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub end: i64,
    pub has_start: bool,
    pub has_end: bool,
    pub step: i64,
}

fn is_number_start(c: char) -> bool {
    c.is_ascii_digit() || c == '-' || c == '+'
}

/// Parse one slice expression. Mirrors `parseRange` field-by-field: an
/// optional signed `start`, then `:`, an optional `end`, then `:`, an
/// optional `step`. A bare integer with no colon sets `step = 0`, a sentinel
/// [`expand`] treats as "select exactly this one line".
pub fn parse(s: &str) -> Result<Range> {
    let s = s.trim();
    let mut r = Range { start: 0, end: 0, has_start: false, has_end: false, step: 1 };

    let mut pos = 0usize;
    if pos < s.len() && is_number_start(s.as_bytes()[pos] as char) {
        let (n, next_pos) = parse_int(s, pos)?;
        r.start = n;
        r.has_start = true;
        pos = next_pos;
    }

    let rest = s[pos..].trim_start();
    pos += s[pos..].len() - rest.len();

    if pos == s.len() {
        if r.has_start {
            r.step = 0;
            return Ok(r);
        }
        bail!("empty range expression");
    }

    if s.as_bytes()[pos] != b':' {
        bail!("expected ':' in range expression {s:?}");
    }
    pos += 1;
    let rest = s[pos..].trim_start();
    pos += s[pos..].len() - rest.len();

    if pos < s.len() && is_number_start(s.as_bytes()[pos] as char) {
        let (n, next_pos) = parse_int(s, pos)?;
        r.end = n;
        r.has_end = true;
        pos = next_pos;
    }
    let rest = s[pos..].trim_start();
    pos += s[pos..].len() - rest.len();

    if pos == s.len() {
        return Ok(r);
    }

    if s.as_bytes()[pos] != b':' {
        bail!("expected ':' in range expression {s:?}");
    }
    pos += 1;
    let rest = s[pos..].trim_start();
    pos += s[pos..].len() - rest.len();

    if pos < s.len() && is_number_start(s.as_bytes()[pos] as char) {
        let (n, next_pos) = parse_int(s, pos)?;
        r.step = n;
        pos = next_pos;
    }
    let rest = s[pos..].trim_start();
    pos += s[pos..].len() - rest.len();

    if pos != s.len() {
        bail!("trailing characters in range expression {s:?}");
    }

    Ok(r)
}

fn parse_int(s: &str, start: usize) -> Result<(i64, usize)> {
    let bytes = s.as_bytes();
    let mut end = start;
    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        bail!("expected a number at byte {start} in {s:?}");
    }
    let n = s[start..end]
        .parse::<i64>()
        .with_context(|| format!("invalid integer {:?}", &s[start..end]))?;
    Ok((n, end))
}

/// Normalize a possibly-negative index against `line_count`. Mirrors
/// `checkLineNumbers`: out of range is reported, not panicked on.
fn normalize(idx: i64, line_count: i64) -> Option<i64> {
    if (idx > 0 && idx > line_count) || (idx < 0 && -idx > line_count) {
        return None;
    }
    Some(if idx < 0 { idx + line_count } else { idx })
}

/// Expand a parsed range into the concrete (already-normalized, in-bounds)
/// line indices it selects against a file of `line_count` lines, in the
/// order `zlines get` should print them.
///
/// Returns `Err` only for malformed ranges (step of 0 on a real range);
/// out-of-range start/end values are reported via `Ok(None)` per element so
/// the caller can print one message and move on to the next `sel`, matching
/// the source's "invalid indices are reported and skipped, not fatal".
pub fn expand(r: Range, line_count: u64) -> Result<Vec<i64>, &'static str> {
    let line_count = line_count as i64;
    let mut r = r;

    if r.has_start {
        let Some(start) = normalize(r.start, line_count) else { return Err("start out of range") };
        r.start = start;
        if r.step == 0 {
            // bare integer: select exactly this one line
            return Ok(vec![r.start]);
        }
    } else {
        r.start = if r.step > 0 { 0 } else { line_count - 1 };
    }

    if r.has_end {
        let Some(end) = normalize(r.end, line_count) else { return Err("end out of range") };
        r.end = end;
    } else {
        r.end = if r.step > 0 { line_count } else { -1 };
    }

    if r.step == 0 {
        return Err("step cannot be zero");
    }

    let mut out = Vec::new();
    if r.step > 0 {
        let mut i = r.start;
        while i < r.end {
            out.push(i);
            i += r.step;
        }
    } else {
        let mut i = r.start;
        while i > r.end {
            out.push(i);
            i += r.step;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_integer_selects_one_line() {
        let r = parse("23").unwrap();
        assert_eq!(r.start, 23);
        assert!(r.has_start);
        assert_eq!(r.step, 0);
        assert_eq!(expand(r, 100).unwrap(), vec![23]);
    }

    #[test]
    fn negative_bare_integer_counts_from_the_end() {
        let r = parse("-1").unwrap();
        assert_eq!(expand(r, 100).unwrap(), vec![99]);
    }

    #[test]
    fn start_end_range() {
        let r = parse("10:100").unwrap();
        assert_eq!(expand(r, 1000).unwrap(), (10..100).collect::<Vec<_>>());
    }

    #[test]
    fn open_start() {
        let r = parse(":100").unwrap();
        assert_eq!(expand(r, 1000).unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn open_end() {
        let r = parse("-10:").unwrap();
        assert_eq!(expand(r, 100).unwrap(), (90..100).collect::<Vec<_>>());
    }

    #[test]
    fn stride() {
        let r = parse("0:20:2").unwrap();
        assert_eq!(expand(r, 100).unwrap(), vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);
    }

    #[test]
    fn full_reverse() {
        let r = parse("::-1").unwrap();
        assert_eq!(expand(r, 5).unwrap(), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn out_of_range_is_reported_not_fatal() {
        let r = parse("50").unwrap();
        assert!(expand(r, 10).is_err());
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(parse("abc").is_err());
        assert!(parse("1:2:3:4").is_err());
    }
}
