//! Core data types: samples, series, time ranges and decoded snapshots.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use serde::Serialize;

/// A single observation: a capture instant and a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: SystemTime,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: SystemTime, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A time-ascending sequence of samples.
pub type Series = Vec<Sample>;

/// Metric key -> series, the namespace exposed to expressions as `Metrics`.
pub type MetricsEnv = HashMap<String, Series>;

/// A query window, matched as `from < timestamp <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: SystemTime,
    pub to: SystemTime,
}

impl TimeRange {
    pub fn new(from: SystemTime, to: SystemTime) -> Self {
        Self { from, to }
    }
}

/// Metric type as declared by a `# TYPE` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Summary,
    Histogram,
    Untyped,
}

impl MetricKind {
    /// Only counters and gauges are cached.
    pub fn is_recorded(&self) -> bool {
        matches!(self, MetricKind::Counter | MetricKind::Gauge)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Summary => "summary",
            MetricKind::Histogram => "histogram",
            MetricKind::Untyped => "untyped",
        };
        f.write_str(name)
    }
}

/// One decoded sample line of a metric family.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEntry {
    pub labels: Vec<(String, String)>,
    pub kind: MetricKind,
    pub value: f64,
}

impl MetricEntry {
    /// Renders the canonical metric key for this entry.
    ///
    /// Label tags are rendered as `name="value"` and sorted, so the same label
    /// set always maps to the same key regardless of enumeration order.
    pub fn key(&self, family: &str) -> String {
        if self.labels.is_empty() {
            return family.to_string();
        }
        let mut tags: Vec<String> = self
            .labels
            .iter()
            .map(|(name, value)| format!(r#"{}="{}""#, name, value))
            .collect();
        tags.sort();
        format!("{}{{{}}}", family, tags.join(","))
    }
}

/// One decoded poll: metric family name -> entries.
pub type Snapshot = HashMap<String, Vec<MetricEntry>>;

/// Static identity of the component, returned verbatim to hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    pub name: &'static str,
    pub plugin_type: &'static str,
}

pub const PLUGIN_INFO: PluginInfo = PluginInfo {
    name: "metrics",
    plugin_type: "apm",
};
