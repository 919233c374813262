//! Line protocol ingestion codec.
//!
//! Converts line protocol text into [`Point`]s and renders points back to
//! the same text, byte for byte when the input was already canonical.
//!
//! ```
//! use chrono::Utc;
//! use tsdb_points::{parse_points_with_precision, FieldValue, Precision};
//!
//! let body = b"cpu,region=uswest,host=serverA value=1.5,count=3i 1\n";
//! assert!(parse_points_with_precision(body, Utc::now(), Precision::Second).is_err());
//!
//! let body = b"cpu,region=uswest,host=serverA value=1.5,count=3 1\n";
//! let points = parse_points_with_precision(body, Utc::now(), Precision::Second).unwrap();
//!
//! assert_eq!(points[0].key(), b"cpu,host=serverA,region=uswest");
//! assert_eq!(points[0].field("count"), Some(&FieldValue::Integer(3)));
//! assert_eq!(
//!     points[0].to_string(),
//!     "cpu,host=serverA,region=uswest value=1.5,count=3 1000000000"
//! );
//! ```

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod batch;
mod batch_points;
mod escape;
mod field;
mod parser;
mod point;
mod precision;
mod tags;

pub use batch::{BatchOutcome, ParsedBatch, parse_batch, parse_points, parse_points_with_precision};
pub use batch_points::{BatchPoints, BatchPointsConfig, WriteConsistency, WriteConsistencyError};
pub use escape::{EscapeClass, escape, unescape};
pub use field::{FieldValue, Fields, InferError, infer_field_value};
pub use parser::{ParseError, ParseErrorKind, parse_point};
pub use point::{Point, PointError, series_key};
pub use precision::{Precision, PrecisionError, TimestampOverflow};
pub use tags::Tags;
