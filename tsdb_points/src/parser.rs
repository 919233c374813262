//! Tokenizes a single line of line protocol into a [`Point`].
//!
//! A line has the shape
//!
//! ```text
//! measurement[,tag_key=tag_value...] field_key=field_value[,field_key=field_value...] [timestamp]
//! ```
//!
//! Delimiters may be escaped with a backslash and, in string field values,
//! quoted, so sections are found by an escape aware scan rather than by
//! splitting on raw bytes.
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::escape::{EscapeClass, unescape};
use crate::field::{Fields, InferError, infer_field_value};
use crate::point::Point;
use crate::precision::Precision;
use crate::tags::Tags;

/// What was wrong with a line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("missing measurement")]
    MissingMeasurement,

    #[error("missing tag key")]
    MissingTagKey,

    #[error("missing tag value for tag key {tag_key:?}")]
    MissingTagValue { tag_key: String },

    #[error(r#"must not contain duplicate tags, but {tag_key:?} was repeated"#)]
    DuplicateTagKey { tag_key: String },

    #[error("missing fields")]
    NoFields,

    #[error("missing field key")]
    MissingFieldKey,

    #[error("missing field value for field key {field_key:?}")]
    MissingFieldValue { field_key: String },

    #[error(r#"must not contain duplicate fields, but {field_key:?} was repeated"#)]
    DuplicateFieldKey { field_key: String },

    #[error("unterminated quoted string value for field key {field_key:?}")]
    UnterminatedQuote { field_key: String },

    #[error("unable to parse value {value:?} of field {field_key:?}")]
    UnparsableFieldValue { field_key: String, value: String },

    #[error("value {value:?} of field {field_key:?} is out of range")]
    FieldValueOutOfRange { field_key: String, value: String },

    #[error("invalid timestamp {value:?}")]
    InvalidTimestamp { value: String },

    #[error("timestamp {value} at precision {precision} overflows a nanosecond timestamp")]
    TimestampOverflow { value: String, precision: Precision },

    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

impl ParseErrorKind {
    /// Errors in the shape of the line.
    pub fn is_structural(&self) -> bool {
        !self.is_numeric()
    }

    /// Errors caused by a number that does not fit its representation.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::FieldValueOutOfRange { .. } | Self::TimestampOverflow { .. }
        )
    }
}

/// A line that could not be parsed, together with its text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unable to parse '{line}': {kind}")]
pub struct ParseError {
    line: String,
    kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(line: impl Into<String>, kind: ParseErrorKind) -> Self {
        Self {
            line: line.into(),
            kind,
        }
    }

    /// The text of the offending line.
    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }
}

/// Parses one line into a point.
///
/// Timestamps on the line are read in `precision`. A line without one gets
/// `default_time` rounded down to `precision`, the same value an explicit
/// timestamp at that precision would have produced.
///
/// ```
/// use chrono::Utc;
/// use tsdb_points::{parse_point, Precision};
///
/// let point = parse_point("cpu,host=A value=1.5 1", Utc::now(), Precision::Second).unwrap();
/// assert_eq!(point.unix_nanos(), 1_000_000_000);
/// ```
pub fn parse_point(
    line: &str,
    default_time: DateTime<Utc>,
    precision: Precision,
) -> Result<Point, ParseError> {
    let trimmed = line.trim_start_matches([' ', '\t']);
    parse_line(trimmed, default_time, precision).map_err(|kind| ParseError::new(line, kind))
}

fn parse_line(
    line: &str,
    default_time: DateTime<Utc>,
    precision: Precision,
) -> Result<Point, ParseErrorKind> {
    let bytes = line.as_bytes();

    let series_end = scan_until(bytes, 0, |b| b == b' ');
    let (name, tags) = parse_series(&line[..series_end])?;

    let fields_start = skip_spaces(bytes, series_end);
    if fields_start == bytes.len() {
        return Err(ParseErrorKind::NoFields);
    }
    let (fields, fields_end) = parse_fields(line, fields_start)?;

    let time = parse_timestamp(line, fields_end, default_time, precision)?;

    Ok(Point::new_unchecked(name, tags, fields, time))
}

/// Returns the index of the first unescaped byte at or after `start` for
/// which `stop` holds, or the length of `bytes`.
///
/// A backslash always consumes the byte after it, whether or not the pair is
/// a recognised escape. Every stop byte is ASCII, so the returned index is a
/// char boundary.
fn scan_until(bytes: &[u8], start: usize, stop: impl Fn(u8) -> bool) -> usize {
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if stop(b) => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_spaces(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i) == Some(&b' ') {
        i += 1;
    }
    i
}

/// Splits `measurement[,key=value...]` into the unescaped measurement and
/// its tags.
fn parse_series(series: &str) -> Result<(String, Tags), ParseErrorKind> {
    let bytes = series.as_bytes();

    let measurement_end = scan_until(bytes, 0, |b| b == b',');
    let measurement = &series[..measurement_end];
    if measurement.is_empty() {
        return Err(ParseErrorKind::MissingMeasurement);
    }
    let name = unescape(measurement, EscapeClass::Measurement).into_owned();

    let mut tags = Tags::new();
    let mut pos = measurement_end;
    while pos < bytes.len() {
        // skip the comma
        let start = pos + 1;
        let end = scan_until(bytes, start, |b| b == b',');
        let (key, value) = parse_tag(&series[start..end])?;
        if tags.contains_key(&key) {
            return Err(ParseErrorKind::DuplicateTagKey { tag_key: key });
        }
        tags.insert(key, value);
        pos = end;
    }

    Ok((name, tags))
}

fn parse_tag(pair: &str) -> Result<(String, String), ParseErrorKind> {
    let eq = scan_until(pair.as_bytes(), 0, |b| b == b'=');
    let raw_key = &pair[..eq];
    if raw_key.is_empty() {
        return Err(ParseErrorKind::MissingTagKey);
    }
    let key = unescape(raw_key, EscapeClass::TagKeyOrValue).into_owned();

    let raw_value = pair.get(eq + 1..).unwrap_or_default();
    if raw_value.is_empty() {
        return Err(ParseErrorKind::MissingTagValue { tag_key: key });
    }
    let value = unescape(raw_value, EscapeClass::TagKeyOrValue).into_owned();

    Ok((key, value))
}

/// Parses the comma separated field set starting at `start`, returning it
/// with the index just past its end.
fn parse_fields(line: &str, start: usize) -> Result<(Fields, usize), ParseErrorKind> {
    let bytes = line.as_bytes();
    let mut fields = Fields::new();
    let mut pos = start;

    loop {
        let key_end = scan_until(bytes, pos, |b| matches!(b, b'=' | b',' | b' '));
        let raw_key = &line[pos..key_end];

        if bytes.get(key_end) != Some(&b'=') {
            let at_section_end = matches!(bytes.get(key_end), None | Some(b' '));
            return match raw_key.is_empty() {
                // a trailing comma closes the field set
                true if at_section_end && !fields.is_empty() => Ok((fields, key_end)),
                true => Err(ParseErrorKind::MissingFieldKey),
                false => Err(ParseErrorKind::MissingFieldValue {
                    field_key: unescape(raw_key, EscapeClass::FieldKey).into_owned(),
                }),
            };
        }
        if raw_key.is_empty() {
            return Err(ParseErrorKind::MissingFieldKey);
        }
        let field_key = unescape(raw_key, EscapeClass::FieldKey).into_owned();

        let value_start = key_end + 1;
        let value_end = if bytes.get(value_start) == Some(&b'"') {
            let close = scan_until(bytes, value_start + 1, |b| b == b'"');
            if close == bytes.len() {
                return Err(ParseErrorKind::UnterminatedQuote { field_key });
            }
            close + 1
        } else {
            scan_until(bytes, value_start, |b| b == b',' || b == b' ')
        };

        if !matches!(bytes.get(value_end), None | Some(b',' | b' ')) {
            // content glued to the end of a quoted string
            let garbage_end = scan_until(bytes, value_end, |b| b == b',' || b == b' ');
            return Err(ParseErrorKind::UnparsableFieldValue {
                field_key,
                value: line[value_start..garbage_end].to_string(),
            });
        }

        let token = &line[value_start..value_end];
        if token.is_empty() {
            return Err(ParseErrorKind::MissingFieldValue { field_key });
        }
        let value = match infer_field_value(token) {
            Ok(value) => value,
            Err(e) => {
                let value = token.to_string();
                return Err(match e {
                    InferError::UnterminatedQuote => ParseErrorKind::UnterminatedQuote { field_key },
                    InferError::Unparsable => {
                        ParseErrorKind::UnparsableFieldValue { field_key, value }
                    }
                    InferError::OutOfRange => {
                        ParseErrorKind::FieldValueOutOfRange { field_key, value }
                    }
                });
            }
        };

        if fields.contains_key(&field_key) {
            return Err(ParseErrorKind::DuplicateFieldKey { field_key });
        }
        fields.insert(field_key, value);

        match bytes.get(value_end) {
            Some(b',') => pos = value_end + 1,
            _ => return Ok((fields, value_end)),
        }
    }
}

/// Reads the optional timestamp following the field set and converts it to
/// nanoseconds.
fn parse_timestamp(
    line: &str,
    start: usize,
    default_time: DateTime<Utc>,
    precision: Precision,
) -> Result<i64, ParseErrorKind> {
    let rest = line[start..].trim_start_matches(' ');
    let (token, trailing) = rest.split_once(' ').unwrap_or((rest, ""));

    if !trailing.trim_start_matches(' ').is_empty() {
        return Err(ParseErrorKind::InvalidTimestamp {
            value: rest.trim_end_matches(' ').to_string(),
        });
    }

    let overflow = |value: String| ParseErrorKind::TimestampOverflow { value, precision };

    if token.is_empty() {
        let nanos = default_time
            .timestamp_nanos_opt()
            .ok_or_else(|| overflow(default_time.to_rfc3339()))?;
        return Ok(precision.truncate(nanos));
    }

    let value: i64 = token.parse().map_err(|e: std::num::ParseIntError| match e.kind() {
        std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow => {
            overflow(token.to_string())
        }
        _ => ParseErrorKind::InvalidTimestamp {
            value: token.to_string(),
        },
    })?;

    precision
        .to_nanos(value)
        .map_err(|_| overflow(token.to_string()))
}
