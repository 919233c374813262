//! Field values and the type inference applied to raw field tokens.
use std::fmt::{self, Display};

use indexmap::IndexMap;
use thiserror::Error;

use crate::escape::{self, EscapeClass};

/// The field set of a point, in insertion order.
///
/// Order is kept so a parsed line re-serializes the way it was written; it
/// carries no meaning for equality of the values themselves.
pub type Fields = IndexMap<String, FieldValue>;

/// A typed field value. See
/// <https://docs.influxdata.com/influxdb/v1/write_protocols/line_protocol_reference/#data-types>
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl FieldValue {
    /// A short name for the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::String(_) => "string",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

/// Writes the value as a line protocol literal.
///
/// Integers are bare, floats always carry a decimal point so they read back
/// as floats, and strings are quoted and escaped.
impl Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => {
                let s = v.to_string();
                f.write_str(&s)?;
                if v.is_finite() && !s.contains('.') {
                    f.write_str(".0")?;
                }
                Ok(())
            }
            Self::Boolean(v) => write!(f, "{v}"),
            Self::String(v) => {
                f.write_str("\"")?;
                escape::write_escaped(f, v, EscapeClass::FieldStringValue)?;
                f.write_str("\"")
            }
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Integer(v.into())
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Why a raw field token could not be turned into a [`FieldValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InferError {
    #[error("string value is missing its closing quote")]
    UnterminatedQuote,

    #[error("value is not an integer, float, boolean or string")]
    Unparsable,

    #[error("value is out of range")]
    OutOfRange,
}

/// Classifies the raw token following `key=` and parses it.
///
/// The checks run in a fixed order: a quoted token is always a string (so
/// `"10"` stays text), then the boolean literals `true`, `t`, `false` and
/// `f` in any case, then integers (no decimal point or exponent), then
/// floats.
///
/// ```
/// use tsdb_points::{infer_field_value, FieldValue};
///
/// assert_eq!(infer_field_value("10").unwrap(), FieldValue::Integer(10));
/// assert_eq!(infer_field_value("11.0").unwrap(), FieldValue::Float(11.0));
/// assert_eq!(infer_field_value("T").unwrap(), FieldValue::Boolean(true));
/// assert_eq!(infer_field_value(r#""10""#).unwrap(), FieldValue::String("10".into()));
/// ```
pub fn infer_field_value(token: &str) -> Result<FieldValue, InferError> {
    if let Some(quoted) = token.strip_prefix('"') {
        let inner = quoted
            .strip_suffix('"')
            .filter(|inner| !ends_with_escape(inner))
            .ok_or(InferError::UnterminatedQuote)?;
        let value = escape::unescape(inner, EscapeClass::FieldStringValue);
        return Ok(FieldValue::String(value.into_owned()));
    }

    if let Some(b) = parse_bool(token) {
        return Ok(FieldValue::Boolean(b));
    }

    if is_integral(token) {
        return token
            .parse()
            .map(FieldValue::Integer)
            .map_err(|_| InferError::OutOfRange);
    }

    match token.parse::<f64>() {
        // a finite literal that rounds to infinity does not fit in an f64
        Ok(v) if v.is_infinite() && !token.to_ascii_lowercase().contains("inf") => {
            Err(InferError::OutOfRange)
        }
        Ok(v) => Ok(FieldValue::Float(v)),
        Err(_) => Err(InferError::Unparsable),
    }
}

fn parse_bool(token: &str) -> Option<bool> {
    const TRUE: [&str; 2] = ["true", "t"];
    const FALSE: [&str; 2] = ["false", "f"];

    if TRUE.iter().any(|t| token.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if FALSE.iter().any(|f| token.eq_ignore_ascii_case(f)) {
        Some(false)
    } else {
        None
    }
}

/// An optional sign followed by at least one digit and nothing else.
fn is_integral(token: &str) -> bool {
    let digits = token.strip_prefix(['-', '+']).unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Whether `s` ends in a backslash that escapes whatever follows it.
fn ends_with_escape(s: &str) -> bool {
    s.bytes().rev().take_while(|&b| b == b'\\').count() % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_integers() {
        assert_eq!(infer_field_value("10").unwrap(), FieldValue::Integer(10));
        assert_eq!(infer_field_value("-42").unwrap(), FieldValue::Integer(-42));
        assert_eq!(infer_field_value("+7").unwrap(), FieldValue::Integer(7));
        assert_eq!(
            infer_field_value("9223372036854775807").unwrap(),
            FieldValue::Integer(i64::MAX)
        );
        assert_eq!(
            infer_field_value("9223372036854775808"),
            Err(InferError::OutOfRange)
        );
    }

    #[test]
    fn infer_floats() {
        assert_eq!(infer_field_value("11.0").unwrap(), FieldValue::Float(11.0));
        assert_eq!(infer_field_value("12.1").unwrap(), FieldValue::Float(12.1));
        assert_eq!(infer_field_value("-0.5").unwrap(), FieldValue::Float(-0.5));
        assert_eq!(infer_field_value("1e3").unwrap(), FieldValue::Float(1000.0));
        assert_eq!(infer_field_value("2.5E-1").unwrap(), FieldValue::Float(0.25));
        assert_eq!(
            infer_field_value("inf").unwrap(),
            FieldValue::Float(f64::INFINITY)
        );
        assert_eq!(infer_field_value("1e400"), Err(InferError::OutOfRange));
    }

    #[test]
    fn infer_booleans() {
        for token in ["true", "True", "TRUE", "t", "T"] {
            assert_eq!(infer_field_value(token).unwrap(), FieldValue::Boolean(true));
        }
        for token in ["false", "False", "FALSE", "f", "F"] {
            assert_eq!(infer_field_value(token).unwrap(), FieldValue::Boolean(false));
        }
    }

    #[test]
    fn infer_strings() {
        assert_eq!(
            infer_field_value(r#""10""#).unwrap(),
            FieldValue::String("10".into())
        );
        assert_eq!(
            infer_field_value(r#""""#).unwrap(),
            FieldValue::String(String::new())
        );
        assert_eq!(
            infer_field_value(r#""foo \" bar""#).unwrap(),
            FieldValue::String(r#"foo " bar"#.into())
        );
        assert_eq!(
            infer_field_value(r#""true""#).unwrap(),
            FieldValue::String("true".into())
        );
    }

    #[test]
    fn infer_rejects() {
        assert_eq!(infer_field_value(r#""test"#), Err(InferError::UnterminatedQuote));
        assert_eq!(infer_field_value(r#"""#), Err(InferError::UnterminatedQuote));
        assert_eq!(infer_field_value(r#""end\""#), Err(InferError::UnterminatedQuote));
        assert_eq!(infer_field_value("yes"), Err(InferError::Unparsable));
        assert_eq!(infer_field_value("10i"), Err(InferError::Unparsable));
        assert_eq!(infer_field_value(""), Err(InferError::Unparsable));
    }

    #[test]
    fn display_literals() {
        assert_eq!(FieldValue::Integer(10).to_string(), "10");
        assert_eq!(FieldValue::Float(11.0).to_string(), "11.0");
        assert_eq!(FieldValue::Float(12.123).to_string(), "12.123");
        assert_eq!(FieldValue::Float(-0.5).to_string(), "-0.5");
        assert_eq!(FieldValue::Boolean(false).to_string(), "false");
        assert_eq!(
            FieldValue::String(r#"say "hi""#.into()).to_string(),
            r#""say \"hi\"""#
        );
    }

    #[test]
    fn display_reparses_to_same_type() {
        for value in [
            FieldValue::Integer(-3),
            FieldValue::Float(3.0),
            FieldValue::Float(1e21),
            FieldValue::Boolean(true),
            FieldValue::String(r"a\b".into()),
        ] {
            assert_eq!(infer_field_value(&value.to_string()).unwrap(), value);
        }
    }
}
