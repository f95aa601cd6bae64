//! Prometheus metrics describing the cache itself.

use axum::http::Method;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Outcome label for poll ticks.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum PollOutcome {
    Success,
    FetchError,
    DecodeError,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PollLabels {
    pub outcome: PollOutcome,
}

/// HTTP method label value.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Other,
}

impl From<&Method> for HttpMethod {
    fn from(method: &Method) -> Self {
        match *method {
            Method::GET => HttpMethod::Get,
            Method::POST => HttpMethod::Post,
            Method::PUT => HttpMethod::Put,
            _ => HttpMethod::Other,
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabelsWithStatus {
    pub method: HttpMethod,
    pub endpoint: String,
    pub status: u16,
}

/// Container for all Prometheus metrics.
pub struct Metrics {
    registry: Registry,

    /// Counter of poll ticks by outcome.
    pub polls_total: Family<PollLabels, Counter>,

    /// Counter of samples written into the store.
    pub samples_recorded_total: Counter,

    /// Counter of decoded entries skipped because of their metric type.
    pub samples_skipped_total: Counter,

    /// Gauge of series currently held by the store.
    pub series_cached: Gauge,

    /// Counter of configuration applications.
    pub reconfigurations_total: Counter,

    /// Counter of HTTP requests.
    pub http_requests_total: Family<HttpLabelsWithStatus, Counter>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let polls_total = Family::<PollLabels, Counter>::default();
        registry.register(
            "apm_polls",
            "Number of poll ticks by outcome",
            polls_total.clone(),
        );

        let samples_recorded_total = Counter::default();
        registry.register(
            "apm_samples_recorded",
            "Number of samples written into the series store",
            samples_recorded_total.clone(),
        );

        let samples_skipped_total = Counter::default();
        registry.register(
            "apm_samples_skipped",
            "Number of decoded samples skipped because they are not counters or gauges",
            samples_skipped_total.clone(),
        );

        let series_cached = Gauge::default();
        registry.register(
            "apm_series_cached",
            "Number of series currently held in memory",
            series_cached.clone(),
        );

        let reconfigurations_total = Counter::default();
        registry.register(
            "apm_reconfigurations",
            "Number of times a configuration was applied",
            reconfigurations_total.clone(),
        );

        let http_requests_total = Family::<HttpLabelsWithStatus, Counter>::default();
        registry.register(
            "http_requests",
            "Total number of HTTP requests",
            http_requests_total.clone(),
        );

        Self {
            registry,
            polls_total,
            samples_recorded_total,
            samples_skipped_total,
            series_cached,
            reconfigurations_total,
            http_requests_total,
        }
    }

    pub(crate) fn record_poll(&self, outcome: PollOutcome) {
        self.polls_total.get_or_create(&PollLabels { outcome }).inc();
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &self.registry) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricKind;
    use crate::openmetrics::parse_text;

    #[test]
    fn should_create_default_metrics() {
        // given/when
        let metrics = Metrics::new();

        // then
        let encoded = metrics.encode();
        assert!(encoded.contains("# HELP apm_polls"));
        assert!(encoded.contains("# HELP apm_samples_recorded"));
        assert!(encoded.contains("# HELP apm_samples_skipped"));
        assert!(encoded.contains("# HELP apm_series_cached"));
        assert!(encoded.contains("# HELP apm_reconfigurations"));
        assert!(encoded.contains("# HELP http_requests"));
    }

    #[test]
    fn should_count_polls_by_outcome() {
        // given
        let metrics = Metrics::new();

        // when
        metrics.record_poll(PollOutcome::Success);
        metrics.record_poll(PollOutcome::Success);
        metrics.record_poll(PollOutcome::FetchError);

        // then
        let encoded = metrics.encode();
        assert!(encoded.contains(r#"apm_polls_total{outcome="Success"} 2"#), "{}", encoded);
        assert!(encoded.contains(r#"apm_polls_total{outcome="FetchError"} 1"#), "{}", encoded);
    }

    #[test]
    fn should_encode_in_a_format_the_decoder_reads_back() {
        // given
        let metrics = Metrics::new();
        metrics.samples_recorded_total.inc_by(7);
        metrics.series_cached.set(3);

        // when
        let snapshot = parse_text(&metrics.encode()).unwrap();

        // then - counter samples keep their `_total` name
        assert_eq!(snapshot["apm_samples_recorded_total"][0].value, 7.0);
        assert_eq!(snapshot["apm_series_cached"][0].value, 3.0);
        assert_eq!(snapshot["apm_series_cached"][0].kind, MetricKind::Gauge);
    }
}
