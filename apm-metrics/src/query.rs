//! Range queries over cached series.
//!
//! # Convention
//!
//! Windows are half-open on the lower bound: a sample matches `range` when
//! `range.from < timestamp <= range.to`. Back-to-back windows `(a, b]`,
//! `(b, c]` therefore never return the same poll twice.

use std::ops::Range;

use crate::error::{Error, Result};
use crate::model::{Sample, Series, TimeRange};
use crate::store::SeriesStore;

/// Computes the index range of `series` that falls inside `range`.
///
/// `series` must be sorted ascending by timestamp. Both bounds are found by
/// binary search for the first sample strictly after the bound.
pub(crate) fn range_indices(series: &[Sample], range: &TimeRange) -> Range<usize> {
    let idx_from = series.partition_point(|s| s.timestamp <= range.from);
    if idx_from >= series.len() {
        return 0..0;
    }
    let idx_to = series.partition_point(|s| s.timestamp <= range.to);
    if idx_to >= idx_from {
        idx_from..idx_to
    } else {
        0..0
    }
}

/// Returns a copy of the samples of `series` inside `range`.
pub fn query_range(series: &[Sample], range: &TimeRange) -> Series {
    series[range_indices(series, range)].to_vec()
}

/// Returns zero or one series for `key`: absent keys contribute nothing.
pub fn query_multiple(store: &SeriesStore, key: &str, range: &TimeRange) -> Vec<Series> {
    store.query_range(key, range).into_iter().collect()
}

/// Returns the single series for `key`, or an empty series if the key is absent.
///
/// Fails with [`Error::AmbiguousResult`] when more than one stream matches.
pub fn query(store: &SeriesStore, key: &str, range: &TimeRange) -> Result<Series> {
    single(query_multiple(store, key, range))
}

pub(crate) fn single(mut streams: Vec<Series>) -> Result<Series> {
    match streams.len() {
        0 => Ok(Series::new()),
        1 => Ok(streams.remove(0)),
        n => Err(Error::AmbiguousResult(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{at, range, series};
    use rstest::rstest;

    #[test]
    fn should_exclude_from_and_include_to() {
        // given
        let s = series(&[(10, 2.0), (20, 3.0), (30, 4.0)]);

        // when
        let result = query_range(&s, &range(10, 20));

        // then
        assert_eq!(result, series(&[(20, 3.0)]));
    }

    #[rstest]
    #[case::all(0, 100, &[10, 20, 30])]
    #[case::upper_inclusive(0, 30, &[10, 20, 30])]
    #[case::lower_exclusive(10, 30, &[20, 30])]
    #[case::between_samples(11, 29, &[20])]
    #[case::before_all(0, 5, &[])]
    #[case::after_all(30, 100, &[])]
    #[case::equal_bounds(20, 20, &[])]
    #[case::inverted(30, 10, &[])]
    fn should_select_half_open_window(
        #[case] from: u64,
        #[case] to: u64,
        #[case] expected: &[u64],
    ) {
        // given
        let s = series(&[(10, 2.0), (20, 3.0), (30, 4.0)]);

        // when
        let result = query_range(&s, &range(from, to));

        // then
        let timestamps: Vec<_> = result.iter().map(|s| s.timestamp).collect();
        let expected: Vec<_> = expected.iter().map(|t| at(*t)).collect();
        assert_eq!(timestamps, expected);
    }

    #[test]
    fn should_return_empty_for_empty_series() {
        // when
        let result = query_range(&[], &range(0, 100));

        // then
        assert!(result.is_empty());
    }

    #[test]
    fn should_include_all_samples_sharing_upper_bound() {
        // given
        let s = series(&[(10, 1.0), (20, 2.0), (20, 3.0)]);

        // when
        let result = query_range(&s, &range(10, 20));

        // then
        assert_eq!(result, series(&[(20, 2.0), (20, 3.0)]));
    }

    #[test]
    fn should_be_idempotent_without_writes() {
        // given
        let s = series(&[(10, 2.0), (20, 3.0), (30, 4.0)]);
        let r = range(5, 25);

        // when
        let first = query_range(&s, &r);
        let second = query_range(&s, &r);

        // then
        assert_eq!(first, second);
    }

    #[test]
    fn should_return_no_streams_for_absent_key() {
        // given
        let store = SeriesStore::new(std::time::Duration::from_secs(60));

        // when
        let streams = query_multiple(&store, "missing", &range(0, 100));

        // then
        assert!(streams.is_empty());
    }

    #[test]
    fn should_return_empty_series_for_absent_key() {
        // given
        let store = SeriesStore::new(std::time::Duration::from_secs(60));

        // when
        let result = query(&store, "missing", &range(0, 100)).unwrap();

        // then
        assert!(result.is_empty());
    }

    #[test]
    fn should_fail_single_when_more_than_one_stream() {
        // given
        let streams = vec![series(&[(1, 1.0)]), series(&[(2, 2.0)])];

        // when
        let result = single(streams);

        // then
        assert_eq!(result, Err(Error::AmbiguousResult(2)));
    }

    #[test]
    fn should_query_single_stream_from_store() {
        // given
        let store = SeriesStore::new(std::time::Duration::from_secs(600));
        for (t, v) in [(10, 2.0), (20, 3.0), (30, 4.0)] {
            store.record("m", at(t), v);
        }

        // when
        let result = query(&store, "m", &range(10, 30)).unwrap();

        // then
        assert_eq!(result, series(&[(20, 3.0), (30, 4.0)]));
    }
}
