//! Error types for apm-metrics operations.

use thiserror::Error;

/// Errors surfaced by the metrics cache.
///
/// `Fetch` and `Decode` are produced off the request path by the poller and
/// only ever logged; the remaining variants are returned to callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Missing or invalid configuration. The component does not start.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Transport failure or non-success status while fetching a snapshot.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The fetched snapshot could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A single-series query matched more than one stream.
    #[error("query returned {0} metric streams, only 1 is expected")]
    AmbiguousResult(usize),

    /// The expression could not be compiled.
    #[error("Compile error: {0}")]
    Compile(String),

    /// The expression failed while running.
    #[error("Run error: {0}")]
    Run(String),

    /// The expression produced a value that is not a series.
    #[error("could not convert expression result: unexpected {0}")]
    ResultType(String),

    /// Invalid request parameters.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Fetch(err.to_string())
    }
}

/// Result type alias for apm-metrics operations.
pub type Result<T> = std::result::Result<T, Error>;
