//! Write statistics owned by whoever constructs the service.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tsdb_points::{FieldValue, Fields, Point, PointError, Tags};

pub const POINTS_WRITTEN: &str = "points_written";
pub const WRITE_FAILURES: &str = "write_failures";

/// The counters of one statistics key.
#[derive(Debug)]
pub struct CounterSet {
    name: String,
    tags: Tags,
    points_written: AtomicU64,
    write_failures: AtomicU64,
}

impl CounterSet {
    fn new(name: String, tags: Tags) -> Self {
        Self {
            name,
            tags,
            points_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn add_points_written(&self, n: u64) {
        self.points_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn points_written(&self) -> u64 {
        self.points_written.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }
}

/// A point in time copy of one [`CounterSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistic {
    pub key: String,
    pub name: String,
    pub tags: Tags,
    pub values: BTreeMap<&'static str, u64>,
}

impl Statistic {
    /// Renders the statistic as a point named after it, one integer field
    /// per counter.
    pub fn to_point(&self, unix_nanos: i64) -> Result<Point, PointError> {
        let fields: Fields = self
            .values
            .iter()
            .map(|(k, v)| {
                let v = i64::try_from(*v).unwrap_or(i64::MAX);
                (k.to_string(), FieldValue::Integer(v))
            })
            .collect();
        Point::from_unix_nanos(self.name.clone(), self.tags.clone(), fields, unix_nanos)
    }
}

/// Named counter sets, registered by key.
///
/// Keys are unique. Registering a key twice hands back the set created
/// first, until the key is unregistered.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    sets: Mutex<BTreeMap<String, Arc<CounterSet>>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        key: impl Into<String>,
        name: impl Into<String>,
        tags: Tags,
    ) -> Arc<CounterSet> {
        let mut sets = self.sets.lock();
        Arc::clone(
            sets.entry(key.into())
                .or_insert_with(|| Arc::new(CounterSet::new(name.into(), tags))),
        )
    }

    /// Drops the set under `key` from future snapshots. Holders of the set
    /// may keep counting into it.
    pub fn unregister(&self, key: &str) -> Option<Arc<CounterSet>> {
        self.sets.lock().remove(key)
    }

    pub fn get(&self, key: &str) -> Option<Arc<CounterSet>> {
        self.sets.lock().get(key).map(Arc::clone)
    }

    /// Copies every counter set, in key order.
    pub fn snapshot(&self) -> Vec<Statistic> {
        self.sets
            .lock()
            .iter()
            .map(|(key, set)| Statistic {
                key: key.clone(),
                name: set.name.clone(),
                tags: set.tags.clone(),
                values: BTreeMap::from([
                    (POINTS_WRITTEN, set.points_written()),
                    (WRITE_FAILURES, set.write_failures()),
                ]),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn register_returns_existing_set() {
        let registry = StatsRegistry::new();
        let a = registry.register("subscriber:db0", "subscriber", Tags::new());
        a.add_points_written(3);

        let b = registry.register("subscriber:db0", "ignored", Tags::from([("x", "y")]));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.name(), "subscriber");
        assert_eq!(b.points_written(), 3);
    }

    #[test]
    fn unregister_removes_from_snapshot() {
        let registry = StatsRegistry::new();
        let old = registry.register("subscriber:db0:rp0:s0", "subscriber", Tags::new());
        old.add_points_written(5);
        registry.register("subscriber", "subscriber", Tags::new());

        assert!(Arc::ptr_eq(&registry.unregister("subscriber:db0:rp0:s0").unwrap(), &old));
        assert!(registry.unregister("subscriber:db0:rp0:s0").is_none());
        assert!(registry.get("subscriber:db0:rp0:s0").is_none());
        assert_eq!(
            registry.snapshot().iter().map(|s| s.key.as_str()).collect::<Vec<_>>(),
            ["subscriber"]
        );

        // registering again starts from zero
        let new = registry.register("subscriber:db0:rp0:s0", "subscriber", Tags::new());
        assert_eq!(new.points_written(), 0);
    }

    #[test]
    fn snapshot_in_key_order() {
        let registry = StatsRegistry::new();
        registry
            .register("b", "subscriber", Tags::from([("database", "db1")]))
            .add_write_failure();
        registry.register("a", "subscriber", Tags::new()).add_points_written(7);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].key, "a");
        assert_eq!(snapshot[0].values[POINTS_WRITTEN], 7);
        assert_eq!(snapshot[1].values[WRITE_FAILURES], 1);
        assert_eq!(snapshot[1].tags.get("database"), Some("db1"));
    }

    #[test]
    fn statistic_as_point() {
        let registry = StatsRegistry::new();
        registry
            .register("s", "subscriber", Tags::from([("database", "db0")]))
            .add_points_written(2);

        let point = registry.snapshot()[0].to_point(10).unwrap();
        assert_eq!(
            point.to_string(),
            "subscriber,database=db0 points_written=2,write_failures=0 10"
        );
    }
}
