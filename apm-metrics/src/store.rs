//! Retention-bounded in-memory series storage.
//!
//! The store maps metric keys to time-ascending series. The map is guarded by
//! one `RwLock` that is only taken for writing when a key is first observed;
//! every series carries its own `RwLock` so appends to one key never block
//! readers of another.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use crate::model::{Sample, Series, TimeRange};
use crate::query::range_indices;

type SharedSeries = Arc<RwLock<Series>>;

/// In-memory series store with a single retention window for all keys.
///
/// A store instance belongs to exactly one applied configuration. Reconfiguring
/// the component replaces the whole store instead of clearing it in place, so
/// readers holding the previous instance keep a consistent view.
#[derive(Debug)]
pub struct SeriesStore {
    retention: Duration,
    series: RwLock<HashMap<String, SharedSeries>>,
}

impl SeriesStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Appends a sample to `key`'s series, creating the series if needed, then
    /// evicts every sample on or before `timestamp - retention`.
    ///
    /// `timestamp` doubles as the reference instant for eviction. A sample
    /// older than the series' newest sample is dropped so the series stays
    /// ordered; returns whether the sample was stored.
    pub fn record(&self, key: &str, timestamp: SystemTime, value: f64) -> bool {
        let series = self.series_for(key);
        let mut samples = series.write().unwrap_or_else(|e| e.into_inner());

        let newest = samples.last().map(|s| s.timestamp);
        if let Some(newest) = newest.filter(|newest| timestamp < *newest) {
            tracing::warn!(
                key,
                "dropping out-of-order sample, clock moved backwards by {:?}",
                newest.duration_since(timestamp).unwrap_or_default()
            );
            return false;
        }

        samples.push(Sample::new(timestamp, value));
        evict(&mut samples, timestamp, self.retention);
        true
    }

    /// Records a batch of `(key, value)` pairs that share one capture instant.
    ///
    /// Returns the number of samples stored.
    pub fn record_batch<I>(&self, now: SystemTime, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        entries
            .into_iter()
            .filter(|(key, value)| self.record(key, now, *value))
            .count()
    }

    /// Returns a copy of the full retained history for `key`.
    pub fn get(&self, key: &str) -> Option<Series> {
        let series = self.lookup(key)?;
        let samples = series.read().unwrap_or_else(|e| e.into_inner());
        Some(samples.clone())
    }

    /// Returns a copy of the samples of `key` inside `range`, or `None` if the
    /// key was never observed.
    ///
    /// The bounds are computed and the slice copied under one read lock, so a
    /// concurrent eviction cannot shift the indices in between.
    pub fn query_range(&self, key: &str, range: &TimeRange) -> Option<Series> {
        let series = self.lookup(key)?;
        let samples = series.read().unwrap_or_else(|e| e.into_inner());
        Some(samples[range_indices(&samples, range)].to_vec())
    }

    /// Returns all known metric keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let map = self.series.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of distinct series.
    pub fn len(&self) -> usize {
        self.series.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str) -> Option<SharedSeries> {
        let map = self.series.read().unwrap_or_else(|e| e.into_inner());
        map.get(key).cloned()
    }

    fn series_for(&self, key: &str) -> SharedSeries {
        if let Some(series) = self.lookup(key) {
            return series;
        }
        let mut map = self.series.write().unwrap_or_else(|e| e.into_inner());
        map.entry(key.to_string()).or_default().clone()
    }
}

/// Drops the prefix of `samples` at or before `now - retention`.
fn evict(samples: &mut Series, now: SystemTime, retention: Duration) {
    let Some(cutoff) = now.checked_sub(retention) else {
        return;
    };
    let expired = samples.partition_point(|s| s.timestamp <= cutoff);
    if expired > 0 {
        samples.drain(..expired);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{at, range, series};
    use std::thread;

    #[test]
    fn should_evict_samples_on_or_before_cutoff() {
        // given
        let store = SeriesStore::new(Duration::from_secs(25));

        // when
        for (t, v) in [(1000, 1.0), (1010, 2.0), (1020, 3.0), (1030, 4.0)] {
            store.record("metric", at(t), v);
        }

        // then
        assert_eq!(
            store.get("metric").unwrap(),
            series(&[(1010, 2.0), (1020, 3.0), (1030, 4.0)])
        );
    }

    #[test]
    fn should_evict_sample_exactly_at_cutoff() {
        // given
        let store = SeriesStore::new(Duration::from_secs(20));
        store.record("metric", at(1000), 1.0);
        store.record("metric", at(1010), 2.0);

        // when - cutoff is exactly 1000
        store.record("metric", at(1020), 3.0);

        // then
        assert_eq!(
            store.get("metric").unwrap(),
            series(&[(1010, 2.0), (1020, 3.0)])
        );
    }

    #[test]
    fn should_not_evict_when_cutoff_precedes_epoch() {
        // given
        let store = SeriesStore::new(Duration::from_secs(25));

        // when
        for (t, v) in [(0, 1.0), (10, 2.0), (20, 3.0)] {
            store.record("metric", at(t), v);
        }

        // then
        assert_eq!(store.get("metric").unwrap().len(), 3);
    }

    #[test]
    fn should_keep_samples_within_retention_after_every_write() {
        // given
        let retention = Duration::from_secs(30);
        let store = SeriesStore::new(retention);

        for t in (1000..1200).step_by(7) {
            // when
            store.record("metric", at(t), t as f64);

            // then
            let samples = store.get("metric").unwrap();
            let cutoff = at(t) - retention;
            assert!(samples.iter().all(|s| s.timestamp > cutoff));
            assert!(samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        }
    }

    #[test]
    fn should_create_keys_lazily() {
        // given
        let store = SeriesStore::new(Duration::from_secs(60));
        assert!(store.is_empty());
        assert!(store.get("a").is_none());

        // when
        store.record("b", at(1), 1.0);
        store.record("a", at(1), 1.0);

        // then
        assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn should_drop_out_of_order_sample() {
        // given
        let store = SeriesStore::new(Duration::from_secs(60));
        store.record("metric", at(20), 1.0);

        // when
        let stored = store.record("metric", at(10), 2.0);

        // then
        assert!(!stored);
        assert_eq!(store.get("metric").unwrap(), series(&[(20, 1.0)]));
    }

    #[test]
    fn should_record_batch_at_one_instant() {
        // given
        let store = SeriesStore::new(Duration::from_secs(60));

        // when
        let count = store.record_batch(
            at(100),
            vec![("a".to_string(), 1.0), ("b".to_string(), 2.0)],
        );

        // then
        assert_eq!(count, 2);
        assert_eq!(store.get("a").unwrap(), series(&[(100, 1.0)]));
        assert_eq!(store.get("b").unwrap(), series(&[(100, 2.0)]));
    }

    #[test]
    fn should_query_range_from_store() {
        // given
        let store = SeriesStore::new(Duration::from_secs(25));
        for (t, v) in [(1000, 1.0), (1010, 2.0), (1020, 3.0), (1030, 4.0)] {
            store.record("metric", at(t), v);
        }

        // when
        let result = store.query_range("metric", &range(1010, 1020));

        // then
        assert_eq!(result, Some(series(&[(1020, 3.0)])));
        assert_eq!(store.query_range("missing", &range(1010, 1020)), None);
    }

    #[test]
    fn should_never_expose_unsorted_series_to_concurrent_readers() {
        // given
        let store = Arc::new(SeriesStore::new(Duration::from_secs(50)));
        let writer_store = store.clone();

        // when
        let writer = thread::spawn(move || {
            for t in 1000..3000 {
                writer_store.record("metric", at(t), t as f64);
            }
        });
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        if let Some(samples) = store.query_range("metric", &range(0, 10_000)) {
                            assert!(samples.len() <= 51);
                            assert!(samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
                        }
                    }
                })
            })
            .collect();

        // then
        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.get("metric").unwrap().len(), 50);
    }
}
