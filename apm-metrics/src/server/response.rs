//! HTTP response types, shaped after the Prometheus API envelope.

use serde::Serialize;

use crate::config::ApmConfig;
use crate::model::{PluginInfo, Sample};
use crate::util::unix_secs_f64;

const STATUS_SUCCESS: &str = "success";

/// Error response matching Prometheus API format
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    #[serde(rename = "errorType")]
    pub error_type: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error_type: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error_type: error_type.into(),
            error: error.into(),
        }
    }

    pub fn bad_data(error: impl Into<String>) -> Self {
        Self::new("bad_data", error)
    }

    pub fn execution(error: impl Into<String>) -> Self {
        Self::new("execution", error)
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self::new("internal", error)
    }
}

/// Successful response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: STATUS_SUCCESS,
            data,
        }
    }
}

/// `(unix seconds, value)` pairs with the value rendered as a string.
pub type Values = Vec<(f64, String)>;

pub fn to_values(samples: &[Sample]) -> Values {
    samples
        .iter()
        .map(|s| (unix_secs_f64(s.timestamp), s.value.to_string()))
        .collect()
}

/// One series of a query result.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesData {
    pub key: String,
    pub values: Values,
}

/// Result of an expression.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluateData {
    pub expr: String,
    pub values: Values,
}

/// The applied configuration. Header values are omitted.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigData {
    pub url: String,
    pub timeout_secs: u64,
    pub refresh_secs: u64,
    pub retention_secs: u64,
    pub headers: Vec<String>,
}

impl From<&ApmConfig> for ConfigData {
    fn from(config: &ApmConfig) -> Self {
        Self {
            url: config.url.clone(),
            timeout_secs: config.timeout.as_secs(),
            refresh_secs: config.refresh.as_secs(),
            retention_secs: config.retention.as_secs(),
            headers: config.headers.keys().cloned().collect(),
        }
    }
}

/// Plugin metadata plus runtime state.
#[derive(Debug, Clone, Serialize)]
pub struct InfoData {
    #[serde(flatten)]
    pub plugin: PluginInfo,
    pub polling: bool,
    pub series: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::series;

    #[test]
    fn should_render_values_as_prometheus_pairs() {
        // given
        let samples = series(&[(10, 1.5), (20, 2.0)]);

        // when
        let json = serde_json::to_value(ApiResponse::success(SeriesData {
            key: "up".to_string(),
            values: to_values(&samples),
        }))
        .unwrap();

        // then
        assert_eq!(
            json,
            serde_json::json!({
                "status": "success",
                "data": {"key": "up", "values": [[10.0, "1.5"], [20.0, "2"]]}
            })
        );
    }

    #[test]
    fn should_serialize_error_type_in_camel_case() {
        // when
        let json = serde_json::to_value(ErrorResponse::bad_data("boom")).unwrap();

        // then
        assert_eq!(
            json,
            serde_json::json!({"status": "error", "errorType": "bad_data", "error": "boom"})
        );
    }
}
