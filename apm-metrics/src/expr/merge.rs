//! Timestamp-aligned merges of two series.
//!
//! Both inputs must be sorted ascending without duplicate timestamps. The
//! pass walks `a` once and scans `b` forward from a cursor that never moves
//! back, so a sample of `a` whose match lies before the cursor is missed. A
//! violated precondition is logged and the pass proceeds regardless.

use crate::model::{Sample, Series};

/// Sums the values of samples present in both series at the same instant.
pub fn sum_merge(a: &[Sample], b: &[Sample]) -> Series {
    merge_with(a, b, |x, y| x + y)
}

/// Subtracts `b` from `a` at the instants present in both series.
pub fn diff_merge(a: &[Sample], b: &[Sample]) -> Series {
    merge_with(a, b, |x, y| x - y)
}

fn merge_with(a: &[Sample], b: &[Sample], op: impl Fn(f64, f64) -> f64) -> Series {
    if !is_strictly_ascending(a) || !is_strictly_ascending(b) {
        tracing::warn!(
            "merging series that are not strictly time-ascending, samples may be dropped"
        );
    }

    let mut merged = Vec::with_capacity(a.len().min(b.len()));
    let mut cursor = 0;
    for x in a {
        let Some(offset) = b[cursor..]
            .iter()
            .position(|y| y.timestamp == x.timestamp)
        else {
            continue;
        };
        // the matched sample stays in the unconsumed suffix
        cursor += offset;
        merged.push(Sample::new(x.timestamp, op(x.value, b[cursor].value)));
    }
    merged
}

fn is_strictly_ascending(series: &[Sample]) -> bool {
    series.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}
