//! Parsing of newline separated request bodies.
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::parser::{ParseError, ParseErrorKind, parse_point};
use crate::point::Point;
use crate::precision::Precision;

/// The result of parsing a whole request body.
///
/// Parsing does not stop at a bad line: every good line becomes a point and
/// the first failure is kept to report back to the writer.
#[derive(Debug, Default)]
pub struct ParsedBatch {
    /// Points of the lines that parsed, in input order.
    pub points: Vec<Point>,
    /// The error of the first line that failed.
    pub first_error: Option<ParseError>,
    /// How many lines failed.
    pub failed_lines: usize,
}

/// How a batch fared overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// No lines at all, only blanks and comments.
    Empty,
    /// Every line parsed.
    Complete,
    /// Some lines parsed and some failed.
    Partial,
    /// Every line failed.
    Failed,
}

impl ParsedBatch {
    pub fn outcome(&self) -> BatchOutcome {
        match (self.points.is_empty(), self.failed_lines) {
            (true, 0) => BatchOutcome::Empty,
            (false, 0) => BatchOutcome::Complete,
            (false, _) => BatchOutcome::Partial,
            (true, _) => BatchOutcome::Failed,
        }
    }

    /// All the points, or the first error if any line failed.
    pub fn into_result(self) -> Result<Vec<Point>, ParseError> {
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(self.points),
        }
    }
}

/// Parses every line of `buf` with nanosecond timestamps, stamping lines
/// without a timestamp with the current time.
pub fn parse_points(buf: &[u8]) -> Result<Vec<Point>, ParseError> {
    parse_points_with_precision(buf, Utc::now(), Precision::Nanosecond)
}

/// Parses every line of `buf`, failing with the first bad line.
pub fn parse_points_with_precision(
    buf: &[u8],
    default_time: DateTime<Utc>,
    precision: Precision,
) -> Result<Vec<Point>, ParseError> {
    parse_batch(buf, default_time, precision).into_result()
}

/// Parses every line of `buf`, keeping the good lines when others fail.
///
/// Lines are separated by `\n`, except inside a quoted string field value.
/// Blank lines and lines starting with `#` are skipped and a trailing `\r`
/// is dropped.
///
/// ```
/// use chrono::Utc;
/// use tsdb_points::{parse_batch, BatchOutcome, Precision};
///
/// let body = b"cpu value=1 1\n# comment\ncpu value=oops 2\nmem free=3i 3\n";
/// let batch = parse_batch(body, Utc::now(), Precision::Nanosecond);
///
/// assert_eq!(batch.points.len(), 1);
/// assert_eq!(batch.failed_lines, 2);
/// assert_eq!(batch.outcome(), BatchOutcome::Partial);
/// ```
pub fn parse_batch(buf: &[u8], default_time: DateTime<Utc>, precision: Precision) -> ParsedBatch {
    let mut batch = ParsedBatch::default();

    for line in body_lines(buf) {
        let line = line.trim_ascii_start();
        if line.is_empty() || line.starts_with(b"#") {
            continue;
        }
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        let result = match std::str::from_utf8(line) {
            Ok(text) => parse_point(text, default_time, precision),
            Err(_) => Err(ParseError::new(
                String::from_utf8_lossy(line),
                ParseErrorKind::InvalidUtf8,
            )),
        };

        match result {
            Ok(point) => batch.points.push(point),
            Err(e) => {
                debug!(error = %e, "rejected line");
                batch.failed_lines += 1;
                batch.first_error.get_or_insert(e);
            }
        }
    }

    batch
}

/// Where the line scanner is within a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Series,
    /// `started` is false while only the separating spaces have been seen.
    Fields { started: bool },
    Timestamp,
}

/// The lines of a request body.
///
/// A newline ends a line unless it is inside a string field value. A string
/// value opens with a `"` directly after the unescaped `=` of a field and
/// closes at the next unescaped `"`; any other quote is an ordinary byte. A
/// comment line ends at its first newline whatever it contains.
#[derive(Debug)]
struct Lines<'a> {
    buf: &'a [u8],
    pos: usize,
}

fn body_lines(buf: &[u8]) -> Lines<'_> {
    Lines { buf, pos: 0 }
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos > self.buf.len() {
            return None;
        }
        let start = self.pos;
        let end = line_end(self.buf, start);
        self.pos = end + 1;
        Some(&self.buf[start..end])
    }
}

/// Index of the newline ending the line that starts at `start`, or the
/// length of `buf` for the last line.
fn line_end(buf: &[u8], start: usize) -> usize {
    let mut i = start;
    while matches!(buf.get(i), Some(b' ' | b'\t' | b'\r')) {
        i += 1;
    }
    if buf.get(i) == Some(&b'#') {
        return next_newline(buf, i);
    }

    let mut section = Section::Series;
    let mut after_equals = false;
    while i < buf.len() {
        let b = buf[i];
        match b {
            b'\n' => return i,
            // a backslash never hides the end of a line
            b'\\' if buf.get(i + 1) != Some(&b'\n') => {
                if let Section::Fields { started } = &mut section {
                    *started = true;
                }
                after_equals = false;
                i += 2;
                continue;
            }
            b'"' if after_equals => {
                after_equals = false;
                i = closing_quote(buf, i + 1);
                continue;
            }
            b' ' => {
                section = match section {
                    Section::Series => Section::Fields { started: false },
                    Section::Fields { started: false } => section,
                    _ => Section::Timestamp,
                };
            }
            _ => {
                if let Section::Fields { started } = &mut section {
                    *started = true;
                }
            }
        }
        after_equals = b == b'=' && matches!(section, Section::Fields { .. });
        i += 1;
    }
    buf.len()
}

/// Index just past the `"` closing a string value whose contents start at
/// `i`, or the length of `buf` when the string is never closed.
fn closing_quote(buf: &[u8], mut i: usize) -> usize {
    while i < buf.len() {
        match buf[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    buf.len()
}

fn next_newline(buf: &[u8], from: usize) -> usize {
    buf[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(buf.len(), |n| from + n)
}
