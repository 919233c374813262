//! Spreading writes over the destinations of one subscription.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::stats::CounterSet;
use crate::{PointsWriter, WriteError, WritePointsRequest};

/// How a subscription with several destinations delivers a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BalanceMode {
    /// Every destination receives every write.
    All,
    /// Destinations take turns; a write goes to the first one that accepts
    /// it.
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown balance mode {0:?}")]
pub struct BalanceModeError(String);

impl FromStr for BalanceMode {
    type Err = BalanceModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALL" => Ok(Self::All),
            "ANY" => Ok(Self::Any),
            _ => Err(BalanceModeError(s.to_string())),
        }
    }
}

impl fmt::Display for BalanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "ALL",
            Self::Any => "ANY",
        })
    }
}

/// A destination together with the counters its writes are recorded in.
#[derive(Debug)]
pub struct Sink {
    writer: Arc<dyn PointsWriter>,
    stats: Arc<CounterSet>,
}

impl Sink {
    pub fn new(writer: Arc<dyn PointsWriter>, stats: Arc<CounterSet>) -> Self {
        Self { writer, stats }
    }

    async fn write(&self, request: &WritePointsRequest) -> Result<(), WriteError> {
        match self.writer.write_points(request).await {
            Ok(()) => {
                self.stats.add_points_written(request.points.len() as u64);
                Ok(())
            }
            Err(e) => {
                self.stats.add_write_failure();
                Err(e)
            }
        }
    }
}

/// Writes to a fixed set of sinks according to a [`BalanceMode`].
#[derive(Debug)]
pub struct BalanceWriter {
    mode: BalanceMode,
    sinks: Vec<Sink>,
    /// Index of the sink an `Any` write tries first.
    next: AtomicUsize,
}

impl BalanceWriter {
    pub fn new(mode: BalanceMode, sinks: Vec<Sink>) -> Self {
        Self {
            mode,
            sinks,
            next: AtomicUsize::new(0),
        }
    }

    pub fn mode(&self) -> BalanceMode {
        self.mode
    }

    /// Attempts every sink, returning the error of the last one that failed.
    async fn write_all(&self, request: &WritePointsRequest) -> Result<(), WriteError> {
        let mut last_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.write(request).await {
                last_err = Some(e);
            }
        }
        last_err.map_or(Ok(()), Err)
    }

    /// Tries sinks in turn from the rotating cursor until one succeeds.
    async fn write_any(&self, request: &WritePointsRequest) -> Result<(), WriteError> {
        let mut result = Ok(());
        for _ in 0..self.sinks.len() {
            let i = self.next.fetch_add(1, Ordering::Relaxed) % self.sinks.len();
            result = self.sinks[i].write(request).await;
            match &result {
                Ok(()) => break,
                Err(e) => warn!(sink = i, error = %e, "write failed, trying next sink"),
            }
        }
        result
    }
}

#[async_trait]
impl PointsWriter for BalanceWriter {
    async fn write_points(&self, request: &WritePointsRequest) -> Result<(), WriteError> {
        match self.mode {
            BalanceMode::All => self.write_all(request).await,
            BalanceMode::Any => self.write_any(request).await,
        }
    }
}
