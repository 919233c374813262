use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tsdb_points::Tags;
use url::Url;

use crate::balance::{BalanceMode, BalanceModeError, BalanceWriter, Sink};
use crate::stats::{CounterSet, StatsRegistry};
use crate::{BoxError, PointsWriter, WritePointsRequest};

const STATS_NAME: &str = "subscriber";

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("unable to list databases: {0}")]
    MetaStore(#[source] BoxError),

    #[error("subscription {subscription}: {source}")]
    BalanceMode {
        subscription: SubscriptionKey,
        source: BalanceModeError,
    },

    #[error("subscription {subscription}: invalid destination {destination:?}: {source}")]
    Destination {
        subscription: SubscriptionKey,
        destination: String,
        source: url::ParseError,
    },

    #[error("subscription {subscription}: unable to create writer for {destination}: {source}")]
    Writer {
        subscription: SubscriptionKey,
        destination: String,
        source: BoxError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub name: String,
    pub retention_policies: Vec<RetentionPolicyInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicyInfo {
    pub name: String,
    pub subscriptions: Vec<SubscriptionInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub name: String,
    /// `ALL` or `ANY`.
    pub mode: String,
    pub destinations: Vec<String>,
}

/// The source of truth for which subscriptions exist.
#[async_trait]
pub trait MetaStore: Debug + Send + Sync + 'static {
    async fn databases(&self) -> Result<Vec<DatabaseInfo>, BoxError>;
}

/// Builds the writer for a destination URL.
pub trait WriterFactory: Debug + Send + Sync + 'static {
    fn new_writer(&self, destination: &Url) -> Result<Arc<dyn PointsWriter>, BoxError>;
}

/// Identifies a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub database: String,
    pub retention_policy: String,
    pub name: String,
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.retention_policy, self.name)
    }
}

/// A running subscription and the statistics keys registered for its
/// destinations.
#[derive(Debug)]
struct Subscription {
    writer: BalanceWriter,
    stats_keys: Vec<String>,
}

/// Forwards writes to the subscriptions of their retention policy.
#[derive(Debug)]
pub struct SubscriberService {
    meta_store: Arc<dyn MetaStore>,
    writer_factory: Arc<dyn WriterFactory>,
    stats: Arc<StatsRegistry>,
    totals: Arc<CounterSet>,
    subs: Mutex<HashMap<SubscriptionKey, Arc<Subscription>>>,
}

impl SubscriberService {
    pub fn new(
        meta_store: Arc<dyn MetaStore>,
        writer_factory: Arc<dyn WriterFactory>,
        stats: Arc<StatsRegistry>,
    ) -> Self {
        let totals = stats.register(STATS_NAME, STATS_NAME, Tags::new());
        Self {
            meta_store,
            writer_factory,
            stats,
            totals,
            subs: Mutex::default(),
        }
    }

    /// The subscriptions currently forwarded to, sorted.
    pub fn subscriptions(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self.subs.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Starts writers for new subscriptions and drops deleted ones.
    ///
    /// Existing subscriptions keep their writers and statistics. When any new
    /// subscription cannot be built the current set is left untouched. The
    /// statistics of removed subscriptions are unregistered.
    pub async fn update(&self) -> Result<(), UpdateError> {
        let databases = self
            .meta_store
            .databases()
            .await
            .map_err(UpdateError::MetaStore)?;

        let current = self.subs.lock().clone();
        let mut next = HashMap::with_capacity(current.len());
        let mut added = Vec::new();

        for db in &databases {
            for rp in &db.retention_policies {
                for sub in &rp.subscriptions {
                    let key = SubscriptionKey {
                        database: db.name.clone(),
                        retention_policy: rp.name.clone(),
                        name: sub.name.clone(),
                    };
                    let subscription = match current.get(&key) {
                        Some(subscription) => Arc::clone(subscription),
                        None => match self.new_subscription(&key, sub) {
                            Ok(subscription) => {
                                let subscription = Arc::new(subscription);
                                added.push((key.clone(), Arc::clone(&subscription)));
                                subscription
                            }
                            Err(e) => {
                                for (_, subscription) in &added {
                                    self.unregister_stats(subscription);
                                }
                                return Err(e);
                            }
                        },
                    };
                    next.insert(key, subscription);
                }
            }
        }

        for (key, subscription) in &current {
            if !next.contains_key(key) {
                self.unregister_stats(subscription);
                info!(subscription = %key, "removed subscription");
            }
        }
        for (key, _) in &added {
            info!(subscription = %key, "added subscription");
        }

        *self.subs.lock() = next;
        Ok(())
    }

    fn unregister_stats(&self, subscription: &Subscription) {
        for stats_key in &subscription.stats_keys {
            self.stats.unregister(stats_key);
        }
    }

    /// Builds the writers of every destination before registering any
    /// statistics, so a failure leaves the registry as it was.
    fn new_subscription(
        &self,
        key: &SubscriptionKey,
        sub: &SubscriptionInfo,
    ) -> Result<Subscription, UpdateError> {
        let mode: BalanceMode = sub.mode.parse().map_err(|source| UpdateError::BalanceMode {
            subscription: key.clone(),
            source,
        })?;

        let mut seen = HashSet::new();
        let mut writers = Vec::with_capacity(sub.destinations.len());
        for dest in &sub.destinations {
            if !seen.insert(dest) {
                debug!(subscription = %key, destination = %dest, "skipping repeated destination");
                continue;
            }
            let url = Url::parse(dest).map_err(|source| UpdateError::Destination {
                subscription: key.clone(),
                destination: dest.clone(),
                source,
            })?;
            let writer =
                self.writer_factory
                    .new_writer(&url)
                    .map_err(|source| UpdateError::Writer {
                        subscription: key.clone(),
                        destination: dest.clone(),
                        source,
                    })?;
            writers.push((dest, writer));
        }

        let mut sinks = Vec::with_capacity(writers.len());
        let mut stats_keys = Vec::with_capacity(writers.len());
        for (dest, writer) in writers {
            let stats_key = [
                STATS_NAME,
                key.database.as_str(),
                key.retention_policy.as_str(),
                key.name.as_str(),
                dest.as_str(),
            ]
            .join(":");
            let tags = Tags::from([
                ("database", key.database.as_str()),
                ("retention_policy", key.retention_policy.as_str()),
                ("name", key.name.as_str()),
                ("mode", sub.mode.as_str()),
                ("destination", dest.as_str()),
            ]);
            let stats = self.stats.register(stats_key.as_str(), STATS_NAME, tags);
            sinks.push(Sink::new(writer, stats));
            stats_keys.push(stats_key);
        }

        Ok(Subscription {
            writer: BalanceWriter::new(mode, sinks),
            stats_keys,
        })
    }

    /// Forwards `request` to every subscription on its database and
    /// retention policy. Failures are logged and counted, never returned.
    ///
    /// The service's `points_written` grows once per subscription that
    /// accepted the write.
    pub async fn write_points(&self, request: &WritePointsRequest) {
        let targets: Vec<_> = self
            .subs
            .lock()
            .iter()
            .filter(|(key, _)| {
                key.database == request.database && key.retention_policy == request.retention_policy
            })
            .map(|(key, subscription)| (key.clone(), Arc::clone(subscription)))
            .collect();

        for (key, subscription) in targets {
            match subscription.writer.write_points(request).await {
                Ok(()) => self.totals.add_points_written(request.points.len() as u64),
                Err(e) => {
                    warn!(subscription = %key, error = %e, "subscription write failed");
                    self.totals.add_write_failure();
                }
            }
        }
    }

    /// Refreshes subscriptions every `poll_interval`, starting immediately,
    /// until `shutdown` is cancelled.
    pub async fn run(&self, poll_interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("subscriber service stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.update().await {
                        warn!(error = %e, "unable to update subscriptions");
                    }
                }
            }
        }
    }
}
