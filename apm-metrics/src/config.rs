//! Configuration for the metrics cache.
//!
//! The component is configured from a flat string-keyed map, the shape hosts
//! hand to plugins. [`ApmConfig::from_map`] validates it and fills defaults.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};

use crate::error::{Error, Result};

pub const CONFIG_KEY_URL: &str = "url";
pub const CONFIG_KEY_TIMEOUT: &str = "timeout";
pub const CONFIG_KEY_HEADER_PREFIX: &str = "header_";
pub const CONFIG_KEY_REFRESH: &str = "refresh";
pub const CONFIG_KEY_RETENTION: &str = "retention";

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REFRESH_SECS: u64 = 10;
pub(crate) const DEFAULT_RETENTION_MINS: u64 = 60;

/// Upper bound for `timeout` and `refresh`.
pub(crate) const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
/// Upper bound for `retention`, one year.
const MAX_RETENTION_MINS: u64 = 365 * 24 * 60;

/// Validated configuration for one activation of the component.
///
/// # Example
///
/// ```ignore
/// use std::collections::HashMap;
/// use apm_metrics::ApmConfig;
///
/// let raw = HashMap::from([
///     ("url".to_string(), "http://localhost:9100/metrics".to_string()),
///     ("header_X_Api_Key".to_string(), "secret".to_string()),
///     ("refresh".to_string(), "5".to_string()),
/// ]);
/// let config = ApmConfig::from_map(&raw)?;
/// assert_eq!(config.headers["X-Api-Key"], "secret");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApmConfig {
    /// Endpoint serving the text exposition.
    pub url: String,

    /// Timeout for a single outbound request.
    pub timeout: Duration,

    /// Static headers sent with every request, keyed by canonical header name.
    pub headers: BTreeMap<String, String>,

    /// Interval between polls.
    pub refresh: Duration,

    /// Maximum age of cached samples.
    pub retention: Duration,
}

impl ApmConfig {
    /// Builds a configuration from the flat key/value map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `url` is missing or empty, or when a
    /// `header_` entry does not form a valid HTTP header.
    pub fn from_map(config: &HashMap<String, String>) -> Result<Self> {
        let url = config
            .get(CONFIG_KEY_URL)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                Error::Config(format!("{:?} config value cannot be empty", CONFIG_KEY_URL))
            })?
            .clone();

        let mut headers = BTreeMap::new();
        for (key, value) in config {
            let Some(raw_name) = key
                .strip_prefix(CONFIG_KEY_HEADER_PREFIX)
                .filter(|name| !name.is_empty())
            else {
                continue;
            };
            let name = canonical_header_key(&raw_name.replace('_', "-"));
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("invalid header name {:?}: {}", name, e)))?;
            HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("invalid value for header {}: {}", name, e)))?;
            headers.insert(name, value.clone());
        }

        Ok(Self {
            url,
            timeout: Duration::from_secs(positive_or(
                config,
                CONFIG_KEY_TIMEOUT,
                DEFAULT_TIMEOUT_SECS,
                MAX_INTERVAL.as_secs(),
            )),
            headers,
            refresh: Duration::from_secs(positive_or(
                config,
                CONFIG_KEY_REFRESH,
                DEFAULT_REFRESH_SECS,
                MAX_INTERVAL.as_secs(),
            )),
            retention: Duration::from_secs(
                60 * positive_or(
                    config,
                    CONFIG_KEY_RETENTION,
                    DEFAULT_RETENTION_MINS,
                    MAX_RETENTION_MINS,
                ),
            ),
        })
    }
}

/// Reads a strictly positive integer capped at `max`, falling back to
/// `default` when the key is absent, not an integer, or not positive.
fn positive_or(config: &HashMap<String, String>, key: &str, default: u64, max: u64) -> u64 {
    config
        .get(key)
        .and_then(|raw| raw.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .map(|value| (value as u64).min(max))
        .unwrap_or(default)
}

/// Canonical MIME header casing: first letter and every letter after a hyphen
/// upper case, the rest lower case (`x-api-key` -> `X-Api-Key`).
pub(crate) fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}
