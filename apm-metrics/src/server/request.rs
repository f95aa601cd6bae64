//! HTTP request types for the query server.

use std::collections::HashMap;
use std::time::SystemTime;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::util::parse_timestamp;

/// Query parameters for `/api/v1/query` and `/api/v1/query_multiple`.
#[derive(Debug, Deserialize)]
pub struct QueryParams {
    /// Canonical metric key, e.g. `http_requests{code="200"}`.
    pub query: String,
    /// Exclusive lower bound, RFC3339 or float unix seconds.
    pub start: Option<String>,
    /// Inclusive upper bound, RFC3339 or float unix seconds.
    pub end: Option<String>,
}

/// Parameters for `/api/v1/evaluate`, from the query string or a form body.
#[derive(Debug, Deserialize)]
pub struct EvaluateParams {
    pub expr: String,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Parsed series query.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRequest {
    pub key: String,
    pub start: Option<SystemTime>,
    pub end: Option<SystemTime>,
}

/// Parsed expression request.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateRequest {
    pub expr: String,
    pub start: Option<SystemTime>,
    pub end: Option<SystemTime>,
}

fn parse_optional(value: Option<&str>) -> Result<Option<SystemTime>> {
    value.map(parse_timestamp).transpose()
}

impl TryFrom<QueryParams> for SeriesRequest {
    type Error = Error;

    fn try_from(params: QueryParams) -> Result<Self> {
        if params.query.is_empty() {
            return Err(Error::InvalidInput(
                "query parameter must not be empty".to_string(),
            ));
        }
        Ok(SeriesRequest {
            key: params.query,
            start: parse_optional(params.start.as_deref())?,
            end: parse_optional(params.end.as_deref())?,
        })
    }
}

impl TryFrom<EvaluateParams> for EvaluateRequest {
    type Error = Error;

    fn try_from(params: EvaluateParams) -> Result<Self> {
        if params.expr.trim().is_empty() {
            return Err(Error::InvalidInput(
                "expr parameter must not be empty".to_string(),
            ));
        }
        Ok(EvaluateRequest {
            expr: params.expr,
            start: parse_optional(params.start.as_deref())?,
            end: parse_optional(params.end.as_deref())?,
        })
    }
}

/// Decodes the body of `PUT /api/v1/config`: a JSON object of strings.
pub fn parse_settings(body: &[u8]) -> Result<HashMap<String, String>> {
    serde_json::from_slice(body)
        .map_err(|e| Error::InvalidInput(format!("Failed to parse config body: {}", e)))
}
