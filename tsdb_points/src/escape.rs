//! Escaping rules for the syntactic positions of line protocol text.
//!
//! Measurement names, tag keys, tag values and field keys escape `,`, `=` and
//! ` ` with a backslash, and those three are the only escape sequences they
//! know. String field values escape `"`, and escape a backslash when it would
//! otherwise be read as the start of an escape sequence. Any other backslash
//! sequence is not an escape: the backslash and the character after it are
//! kept verbatim, so `eas\t` is the six character string `eas\t` and never
//! contains a tab, and `C:\\temp` in a tag keeps both backslashes.
use std::borrow::Cow;
use std::fmt;

/// The position a piece of text occupies in a line of line protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EscapeClass {
    Measurement,
    TagKeyOrValue,
    FieldKey,
    /// The contents of a double quoted string field value, quotes excluded.
    FieldStringValue,
}

// https://docs.influxdata.com/influxdb/cloud/reference/syntax/line-protocol/#special-characters
const COMMA_EQ_SPACE: &[u8] = b",= ";
const DOUBLE_QUOTE: &[u8] = b"\"";

impl EscapeClass {
    fn delimiters(self) -> &'static [u8] {
        match self {
            Self::Measurement | Self::TagKeyOrValue | Self::FieldKey => COMMA_EQ_SPACE,
            Self::FieldStringValue => DOUBLE_QUOTE,
        }
    }

    /// Whether a backslash followed by `c` forms an escape sequence.
    fn is_escapable(self, c: u8) -> bool {
        match self {
            Self::FieldStringValue => c == b'\\' || c == b'"',
            _ => self.delimiters().contains(&c),
        }
    }

    fn must_escape_at(self, bytes: &[u8], i: usize) -> bool {
        match (self, bytes[i]) {
            (Self::FieldStringValue, b'\\') => {
                bytes.get(i + 1).is_none_or(|&next| self.is_escapable(next))
            }
            (_, c) => self.delimiters().contains(&c),
        }
    }
}

/// Whether `raw` survives [`escape`] followed by [`unescape`] at the
/// position described by `class`.
///
/// Outside string values a backslash cannot itself be escaped, so an odd run
/// of backslashes right before a delimiter or at the end of the text would
/// swallow the character written after it.
pub(crate) fn is_encodable(raw: &str, class: EscapeClass) -> bool {
    if class == EscapeClass::FieldStringValue {
        return true;
    }

    let mut backslashes = 0;
    for &b in raw.as_bytes() {
        if b == b'\\' {
            backslashes += 1;
            continue;
        }
        if backslashes % 2 == 1 && class.is_escapable(b) {
            return false;
        }
        backslashes = 0;
    }
    backslashes % 2 == 0
}

/// Escapes `raw` for output at the position described by `class`.
///
/// Borrows when nothing needs escaping, which is the common case.
///
/// ```
/// use tsdb_points::{escape, EscapeClass};
///
/// assert_eq!(escape("cpu,main", EscapeClass::Measurement), r"cpu\,main");
/// assert_eq!(escape(r#"say "hi""#, EscapeClass::FieldStringValue), r#"say \"hi\""#);
/// assert_eq!(escape("plain", EscapeClass::TagKeyOrValue), "plain");
/// ```
pub fn escape(raw: &str, class: EscapeClass) -> Cow<'_, str> {
    let bytes = raw.as_bytes();
    if !(0..bytes.len()).any(|i| class.must_escape_at(bytes, i)) {
        return Cow::Borrowed(raw);
    }

    let mut escaped = String::with_capacity(raw.len() + 4);
    // writing into a String cannot fail
    let _ = write_escaped(&mut escaped, raw, class);
    Cow::Owned(escaped)
}

/// Writes `raw` to `w`, escaping it for the position described by `class`.
pub(crate) fn write_escaped<W: fmt::Write>(w: &mut W, raw: &str, class: EscapeClass) -> fmt::Result {
    let bytes = raw.as_bytes();
    let mut last = 0;

    for i in 0..bytes.len() {
        if class.must_escape_at(bytes, i) {
            // every escaped character is ASCII so `i` is a char boundary
            w.write_str(&raw[last..i])?;
            w.write_char('\\')?;
            last = i;
        }
    }

    w.write_str(&raw[last..])
}

/// Removes the escaping of `text` read from the position described by `class`.
///
/// ```
/// use tsdb_points::{unescape, EscapeClass};
///
/// assert_eq!(unescape(r"east\,west", EscapeClass::TagKeyOrValue), "east,west");
/// assert_eq!(unescape(r"eas\t", EscapeClass::TagKeyOrValue), r"eas\t");
/// ```
pub fn unescape(text: &str, class: EscapeClass) -> Cow<'_, str> {
    if !text.contains('\\') {
        return Cow::Borrowed(text);
    }

    let bytes = text.as_bytes();
    let mut unescaped = String::with_capacity(text.len());
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            i += 1;
            continue;
        }

        match bytes.get(i + 1) {
            Some(&next) if class.is_escapable(next) => {
                unescaped.push_str(&text[last..i]);
                last = i + 1;
                i += 2;
            }
            // not an escape sequence, both characters pass through unchanged
            Some(_) => i += 2,
            None => i += 1,
        }
    }

    unescaped.push_str(&text[last..]);
    Cow::Owned(unescaped)
}
