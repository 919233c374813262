//! Accumulation of points for a batched write.
use std::fmt::{self, Write};
use std::str::FromStr;

use parking_lot::Mutex;
use thiserror::Error;

use crate::point::Point;
use crate::precision::Precision;

/// How many replicas must acknowledge a write before it succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteConsistency {
    Any,
    One,
    Quorum,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown write consistency {0:?}, expected any, one, quorum or all")]
pub struct WriteConsistencyError(String);

impl fmt::Display for WriteConsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Any => "any",
            Self::One => "one",
            Self::Quorum => "quorum",
            Self::All => "all",
        })
    }
}

impl FromStr for WriteConsistency {
    type Err = WriteConsistencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "any" => Self::Any,
            "one" => Self::One,
            "quorum" => Self::Quorum,
            "all" => Self::All,
            _ => return Err(WriteConsistencyError(s.to_string())),
        })
    }
}

/// Where a batch is written and how its timestamps are rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPointsConfig {
    pub database: String,
    /// Empty selects the database's default retention policy.
    pub retention_policy: String,
    pub precision: Precision,
    /// `None` leaves the choice to the server.
    pub write_consistency: Option<WriteConsistency>,
}

/// Points gathered for one write request.
///
/// Producers on several threads may append through a shared reference.
/// Appends and snapshots take the same lock, so a reader sees every point
/// of an append or none of them.
#[derive(Debug, Default)]
pub struct BatchPoints {
    config: BatchPointsConfig,
    points: Mutex<Vec<Point>>,
}

impl BatchPoints {
    pub fn new(config: BatchPointsConfig) -> Self {
        Self {
            config,
            points: Mutex::default(),
        }
    }

    pub fn config(&self) -> &BatchPointsConfig {
        &self.config
    }

    pub fn add_point(&self, point: Point) {
        self.points.lock().push(point);
    }

    /// Appends all of `points` as one step.
    pub fn add_points(&self, points: impl IntoIterator<Item = Point>) {
        let points: Vec<_> = points.into_iter().collect();
        self.points.lock().extend(points);
    }

    /// A copy of the points appended so far.
    pub fn points(&self) -> Vec<Point> {
        self.points.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.points.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.lock().is_empty()
    }

    /// Renders every point at the batch precision, one per line, each line
    /// terminated by a newline.
    pub fn to_line_protocol(&self) -> String {
        let points = self.points.lock();
        let mut body = String::with_capacity(points.len() * 64);
        for point in &*points {
            // writing into a String cannot fail
            let _ = point.write_line_protocol(&mut body, self.config.precision);
            let _ = body.write_char('\n');
        }
        body
    }

    /// Consumes the batch, returning its points.
    pub fn into_points(self) -> Vec<Point> {
        self.points.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::field::Fields;
    use crate::tags::Tags;
    use pretty_assertions::assert_eq;

    fn point(name: &str, value: i64, nanos: i64) -> Point {
        Point::from_unix_nanos(
            name,
            Tags::from([("host", "serverA")]),
            Fields::from([("value".to_string(), value.into())]),
            nanos,
        )
        .unwrap()
    }

    #[test]
    fn consistency_strings() {
        for c in [
            WriteConsistency::Any,
            WriteConsistency::One,
            WriteConsistency::Quorum,
            WriteConsistency::All,
        ] {
            assert_eq!(c.to_string().parse::<WriteConsistency>().unwrap(), c);
        }
        assert_eq!("QUORUM".parse::<WriteConsistency>().unwrap(), WriteConsistency::Quorum);
        assert!("most".parse::<WriteConsistency>().is_err());
    }

    #[test]
    fn renders_at_batch_precision() {
        let batch = BatchPoints::new(BatchPointsConfig {
            database: "db0".into(),
            precision: Precision::Second,
            ..Default::default()
        });
        batch.add_point(point("cpu", 1, 1_000_000_000));
        batch.add_point(point("mem", 2, 2_500_000_000));

        assert_eq!(batch.config().database, "db0");
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.to_line_protocol(),
            "cpu,host=serverA value=1 1\nmem,host=serverA value=2 2\n"
        );
    }

    #[test]
    fn empty_batch_renders_nothing() {
        let batch = BatchPoints::default();
        assert!(batch.is_empty());
        assert_eq!(batch.to_line_protocol(), "");
    }

    #[test]
    fn concurrent_appends_are_all_kept() {
        let batch = Arc::new(BatchPoints::default());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let batch = Arc::clone(&batch);
                thread::spawn(move || {
                    for i in 0..100 {
                        batch.add_point(point("cpu", t * 100 + i, i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut values: Vec<_> = batch
            .points()
            .iter()
            .filter_map(|p| p.field("value").and_then(|v| v.as_i64()))
            .collect();
        values.sort_unstable();
        assert_eq!(values, (0..400).collect::<Vec<_>>());
    }

    #[test]
    fn add_points_is_one_append() {
        let batch = BatchPoints::default();
        batch.add_points([point("a", 1, 0), point("b", 2, 0)]);
        let names: Vec<_> = batch
            .into_points()
            .into_iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, ["a", "b"]);
    }
}
