//! HTTP surface of the metrics cache.

mod config;
mod error;
mod handlers;
mod http;
pub(crate) mod metrics;
mod middleware;
mod request;
mod response;

pub use config::{CliArgs, ServerConfig, load_settings};
pub use http::{ApmServer, router};
pub use metrics::Metrics;
