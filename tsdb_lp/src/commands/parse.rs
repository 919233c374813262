use std::ffi::OsStr;
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};
use tsdb_points::{BatchOutcome, ParseError, Point, Precision, parse_batch};

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("unable to read {}: {source}", path.display())]
    ReadFile { path: PathBuf, source: io::Error },

    #[error("unable to read standard input: {0}")]
    ReadStdin(#[source] io::Error),

    #[error("unable to write output: {0}")]
    Write(#[from] io::Error),

    #[error("{failed} line(s) rejected, first error: {first}")]
    Rejected { failed: usize, first: ParseError },
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    /// File of line protocol to read; standard input when omitted or `-`
    #[clap(action)]
    file: Option<PathBuf>,

    /// Precision of the timestamps in the input: n, u, ms, s, m or h
    #[clap(
        long = "precision",
        env = "LP_PRECISION",
        default_value = "n",
        action
    )]
    precision: Precision,

    /// Precision of the timestamps written out. Defaults to `--precision`
    #[clap(long = "output-precision", env = "LP_OUTPUT_PRECISION", action)]
    output_precision: Option<Precision>,

    /// Time given to lines without a timestamp, as RFC 3339. Defaults to now
    #[clap(long = "default-time", value_parser = parse_rfc3339)]
    default_time: Option<DateTime<Utc>>,

    /// Write the series key of each point instead of the whole point
    #[clap(long = "keys", action)]
    keys: bool,

    /// Succeed as long as one line parsed, reporting rejected lines on stderr
    #[clap(long = "accept-partial", action)]
    accept_partial: bool,
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}

pub(crate) fn command(config: Config) -> Result<()> {
    let input = read_input(config.file.as_ref())?;
    let default_time = config.default_time.unwrap_or_else(Utc::now);

    let batch = parse_batch(&input, default_time, config.precision);
    info!(
        points = batch.points.len(),
        failed_lines = batch.failed_lines,
        "parsed input"
    );

    let output_precision = config.output_precision.unwrap_or(config.precision);
    write_points(&batch.points, output_precision, config.keys)?;

    let outcome = batch.outcome();
    match batch.first_error {
        None => Ok(()),
        Some(first) if config.accept_partial && outcome == BatchOutcome::Partial => {
            eprintln!(
                "{} line(s) rejected, first error: {first}",
                batch.failed_lines
            );
            Ok(())
        }
        Some(first) => Err(Error::Rejected {
            failed: batch.failed_lines,
            first,
        }),
    }
}

fn read_input(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) if path.as_os_str() != OsStr::new("-") => {
            debug!(path = %path.display(), "reading input file");
            fs::read(path).map_err(|source| Error::ReadFile {
                path: path.clone(),
                source,
            })
        }
        _ => {
            let mut buf = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut buf)
                .map_err(Error::ReadStdin)?;
            Ok(buf)
        }
    }
}

fn write_points(points: &[Point], precision: Precision, keys: bool) -> Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    for point in points {
        if keys {
            out.write_all(point.key())?;
            out.write_all(b"\n")?;
        } else {
            writeln!(out, "{}", point.precision_string(precision))?;
        }
    }
    out.flush()?;
    Ok(())
}
