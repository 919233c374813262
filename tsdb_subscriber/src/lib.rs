//! Forwarding of accepted writes to subscribed destinations.
//!
//! Each retention policy may carry subscriptions, and each subscription
//! lists destinations plus a [`BalanceMode`] saying whether every
//! destination or any one of them receives a write. The
//! [`SubscriberService`] keeps its subscriptions in step with a
//! [`MetaStore`] and fans every matching [`WritePointsRequest`] out through
//! them.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;
use tsdb_points::Point;

mod balance;
mod service;
mod stats;

pub use balance::{BalanceMode, BalanceModeError, BalanceWriter, Sink};
pub use service::{
    DatabaseInfo, MetaStore, RetentionPolicyInfo, SubscriberService, SubscriptionInfo,
    SubscriptionKey, UpdateError, WriterFactory,
};
pub use stats::{CounterSet, POINTS_WRITTEN, Statistic, StatsRegistry, WRITE_FAILURES};

/// Errors from collaborators the service does not own.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A batch of points accepted for one database and retention policy.
#[derive(Debug, Clone, PartialEq)]
pub struct WritePointsRequest {
    pub database: String,
    pub retention_policy: String,
    pub points: Vec<Point>,
}

#[derive(Debug, Error)]
#[error("write failed: {0}")]
pub struct WriteError(#[source] BoxError);

impl WriteError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self(source.into())
    }
}

/// A destination that accepts writes.
#[async_trait]
pub trait PointsWriter: Debug + Send + Sync + 'static {
    async fn write_points(&self, request: &WritePointsRequest) -> Result<(), WriteError>;
}
