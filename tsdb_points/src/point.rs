//! The in-memory representation of a single point.
use std::fmt::{self, Display, Write};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::escape::{self, EscapeClass};
use crate::field::{FieldValue, Fields};
use crate::precision::Precision;
use crate::tags::Tags;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointError {
    #[error("measurement name must not be empty")]
    EmptyMeasurement,

    #[error("point must have at least one field")]
    NoFields,

    #[error("tag key must not be empty")]
    EmptyTagKey,

    #[error("tag {tag_key:?} must have a value")]
    EmptyTagValue { tag_key: String },

    #[error("field key must not be empty")]
    EmptyFieldKey,

    #[error("{text:?} has an unpaired backslash before a delimiter or at its end")]
    UnpairedBackslash { text: String },

    #[error("time {time} is outside the range of a nanosecond timestamp")]
    TimestampOverflow { time: DateTime<Utc> },
}

pub(crate) type Result<T, E = PointError> = std::result::Result<T, E>;

/// A measurement, its tag set, its field set and a nanosecond timestamp.
///
/// The measurement and tag set identify the series the point belongs to and
/// together form its [key](Self::key). Points are immutable; deriving a
/// changed point means constructing a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    name: String,
    tags: Tags,
    fields: Fields,
    time: i64,
    key: String,
}

impl Point {
    /// Creates a point, checking that it has a name and at least one field.
    ///
    /// ```
    /// use chrono::DateTime;
    /// use tsdb_points::{Fields, Point, Tags};
    ///
    /// let point = Point::new(
    ///     "cpu",
    ///     Tags::from([("region", "uswest"), ("host", "serverA")]),
    ///     Fields::from([("value".to_string(), 1.0.into())]),
    ///     DateTime::from_timestamp(1, 0).unwrap(),
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(point.key(), b"cpu,host=serverA,region=uswest");
    /// assert_eq!(point.to_string(), "cpu,host=serverA,region=uswest value=1.0 1000000000");
    /// ```
    pub fn new(
        name: impl Into<String>,
        tags: Tags,
        fields: Fields,
        time: DateTime<Utc>,
    ) -> Result<Self> {
        let nanos = time
            .timestamp_nanos_opt()
            .ok_or(PointError::TimestampOverflow { time })?;
        Self::from_unix_nanos(name, tags, fields, nanos)
    }

    /// Like [`Self::new`] with the time given as nanoseconds since the epoch.
    pub fn from_unix_nanos(
        name: impl Into<String>,
        tags: Tags,
        fields: Fields,
        time: i64,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(PointError::EmptyMeasurement);
        }
        check_encodable(&name, EscapeClass::Measurement)?;

        for (key, value) in &tags {
            if key.is_empty() {
                return Err(PointError::EmptyTagKey);
            }
            if value.is_empty() {
                return Err(PointError::EmptyTagValue {
                    tag_key: key.clone(),
                });
            }
            check_encodable(key, EscapeClass::TagKeyOrValue)?;
            check_encodable(value, EscapeClass::TagKeyOrValue)?;
        }

        if fields.is_empty() {
            return Err(PointError::NoFields);
        }
        for key in fields.keys() {
            if key.is_empty() {
                return Err(PointError::EmptyFieldKey);
            }
            check_encodable(key, EscapeClass::FieldKey)?;
        }

        Ok(Self::new_unchecked(name, tags, fields, time))
    }

    /// Callers guarantee a non-empty name and field set.
    pub(crate) fn new_unchecked(name: String, tags: Tags, fields: Fields, time: i64) -> Self {
        let key = series_key(&name, &tags);
        Self {
            name,
            tags,
            fields,
            time,
            key,
        }
    }

    /// Returns a copy of this point at a different time.
    pub fn with_time(&self, time: DateTime<Utc>) -> Result<Self> {
        let nanos = time
            .timestamp_nanos_opt()
            .ok_or(PointError::TimestampOverflow { time })?;
        Ok(Self {
            time: nanos,
            ..self.clone()
        })
    }

    /// The unescaped measurement name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The series key: the escaped measurement followed by the
    /// [hash key](Tags::hash_key) of the tags, e.g.
    /// `cpu,host=serverA,region=uswest`.
    pub fn key(&self) -> &[u8] {
        self.key.as_bytes()
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.time)
    }

    pub fn unix_nanos(&self) -> i64 {
        self.time
    }

    /// Serializes the point with its timestamp written in `precision`.
    pub fn precision_string(&self, precision: Precision) -> String {
        let mut s = String::with_capacity(self.key.len() + 16 * self.fields.len() + 20);
        // writing into a String cannot fail
        let _ = self.write_line_protocol(&mut s, precision);
        s
    }

    /// Writes the point as one line of line protocol, without a trailing
    /// newline. Tags are written in key order, fields in insertion order.
    pub fn write_line_protocol<W: Write>(&self, w: &mut W, precision: Precision) -> fmt::Result {
        w.write_str(&self.key)?;

        let mut sep = ' ';
        for (key, value) in &self.fields {
            w.write_char(sep)?;
            escape::write_escaped(w, key, EscapeClass::FieldKey)?;
            write!(w, "={value}")?;
            sep = ',';
        }

        write!(w, " {}", precision.from_nanos(self.time))
    }
}

/// Converts a point to canonical line protocol with a nanosecond timestamp.
impl Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_line_protocol(f, Precision::Nanosecond)
    }
}

fn check_encodable(text: &str, class: EscapeClass) -> Result<()> {
    if escape::is_encodable(text, class) {
        Ok(())
    } else {
        Err(PointError::UnpairedBackslash {
            text: text.to_string(),
        })
    }
}

/// Builds the series key of `name` and `tags`.
///
/// Two tag sets with the same pairs produce the same key whatever order
/// they were written in.
pub fn series_key(name: &str, tags: &Tags) -> String {
    let mut key = String::with_capacity(name.len() + tags.encoded_len());
    // writing into a String cannot fail
    let _ = escape::write_escaped(&mut key, name, EscapeClass::Measurement);
    let _ = tags.write_hash_key(&mut key);
    key
}
