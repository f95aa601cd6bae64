//! APM Metrics - an in-memory cache of a Prometheus text endpoint.
//!
//! The cache polls one endpoint serving the Prometheus text exposition format
//! at a fixed interval and keeps a bounded history of every counter and gauge
//! it sees. Callers read that history back by metric key over a time window,
//! or combine several series with a small expression language.
//!
//! # Architecture
//!
//! A [`Poller`] owns a background task that fetches a [`Snapshot`] through a
//! [`SourceFetcher`], stamps all of its samples with one capture instant and
//! appends them to a [`SeriesStore`]. The store evicts samples older than the
//! retention window on every append. [`MetricsApm`] owns the current store and
//! poller and swaps both whenever a new configuration is applied.
//!
//! # Key Concepts
//!
//! - **Metric key**: the family name plus its sorted `name="value"` labels,
//!   e.g. `http_requests{code="200",method="get"}`.
//! - **Range**: queries match `from < timestamp <= to`.
//! - **Expressions**: `Metrics["a"] + Metrics["b"]` aligns two series on
//!   identical timestamps; see [`expr`].
//!
//! # Example
//!
//! ```ignore
//! use std::collections::HashMap;
//! use apm_metrics::MetricsApm;
//!
//! let apm = MetricsApm::default();
//! apm.configure(&HashMap::from([
//!     ("url".to_string(), "http://localhost:9100/metrics".to_string()),
//!     ("refresh".to_string(), "5".to_string()),
//! ]))
//! .await?;
//!
//! let range = apm.time_range(None, None);
//! let series = apm.query("node_load1", &range)?;
//! let diff = apm.evaluate(r#"Metrics["rx_bytes"] - Metrics["tx_bytes"]"#, &range)?;
//! ```

mod apm;
mod config;
mod error;
pub mod expr;
mod fetcher;
mod model;
mod openmetrics;
mod poller;
pub mod query;
pub mod server;
mod store;
#[cfg(test)]
mod test_utils;
mod util;

pub use apm::{FetcherFactory, MetricsApm};
pub use config::ApmConfig;
pub use error::{Error, Result};
pub use fetcher::{HttpFetcher, RetryPolicy, SourceFetcher};
pub use model::{
    MetricEntry, MetricKind, MetricsEnv, PLUGIN_INFO, PluginInfo, Sample, Series, Snapshot,
    TimeRange,
};
pub use openmetrics::parse_text;
pub use poller::{Poller, RecordStats, record_snapshot};
pub use server::Metrics;
pub use store::SeriesStore;
pub use util::parse_timestamp;
